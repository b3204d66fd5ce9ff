// VMProbe - QEMU Monitor Introspection Client
// Copyright (C) 2026 VMProbe Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Read};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::{QmpError, POLL_TIMEOUT_MS, READ_CHUNK};

/// Read from a non-blocking descriptor until it goes quiet.
///
/// The monitor does not frame its replies, so "complete" has to be
/// inferred: the descriptor is polled for readability with a fixed
/// timeout, and the first poll that expires with no events ends the
/// reply. Data is read in fixed-size chunks, so a burst larger than one
/// chunk is still fully collected as long as bytes keep arriving inside
/// the timeout window. Bytes beyond `capacity` are read off the socket
/// but dropped.
///
/// Every call pays at least one timeout interval; that is the price of
/// framing by quiescence.
pub fn drain(stream: &UnixStream, capacity: usize) -> Result<Vec<u8>, QmpError> {
    let mut reader = stream;
    let mut collected = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let readable = {
            let mut fds = [PollFd::new(stream.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(0) => break,
                Ok(_) => fds[0]
                    .revents()
                    .is_some_and(|r| r.contains(PollFlags::POLLIN)),
                Err(e) => return Err(QmpError::Io(io::Error::from(e))),
            }
        };
        if !readable {
            // POLLHUP or POLLERR with nothing left to read.
            break;
        }

        match reader.read(&mut chunk) {
            // Peer hangup: nothing further can arrive.
            Ok(0) => break,
            Ok(n) => {
                let room = capacity.saturating_sub(collected.len());
                collected.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(QmpError::Io(e)),
        }
    }

    tracing::trace!(bytes = collected.len(), "reply drained");
    Ok(collected)
}
