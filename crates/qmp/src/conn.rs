// VMProbe - QEMU Monitor Introspection Client
// Copyright (C) 2026 VMProbe Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Write};
use std::os::fd::IntoRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::debug;
use vmprobe_core::{RegisterSet, VcpuList};

use crate::drain::drain;
use crate::{
    QmpError, CAPABILITIES_ACK, CAPABILITIES_COMMAND, GREETING, HANDSHAKE_CAPACITY,
    INFO_CPUS_COMMAND, INFO_REGISTERS_COMMAND, REPLY_CAPACITY,
};

/// An established control connection to the monitor.
///
/// The descriptor is non-blocking for its whole lifetime and every reply
/// is collected by the quiescence-based drain reader. One connection
/// serves one caller; queries are single synchronous round trips.
#[derive(Debug)]
pub struct QmpConnection {
    stream: UnixStream,
    path: PathBuf,
}

impl QmpConnection {
    /// Connect to the monitor socket and consume its greeting.
    ///
    /// On failure nothing stays open: a connect error never hands back a
    /// half-built connection, and a bad greeting drops the socket on the
    /// way out.
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self, QmpError> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(QmpError::Connect {
                path,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty socket path"),
            });
        }

        let stream = UnixStream::connect(&path).map_err(|source| QmpError::Connect {
            path: path.clone(),
            source,
        })?;
        stream.set_nonblocking(true)?;

        let conn = Self { stream, path };

        let greeting = drain(&conn.stream, HANDSHAKE_CAPACITY)?;
        if greeting.is_empty() || !starts_with_ignore_case(&greeting, GREETING.as_bytes()) {
            return Err(QmpError::Protocol("missing QMP greeting".into()));
        }
        debug!(path = %conn.path.display(), "monitor greeting accepted");

        Ok(conn)
    }

    /// Negotiate capabilities, moving the connection into command mode.
    ///
    /// There is no retry: on a mismatched acknowledgment the connection
    /// is unusable and the caller must close it.
    pub fn negotiate(&mut self) -> Result<(), QmpError> {
        self.stream.write_all(CAPABILITIES_COMMAND.as_bytes())?;

        let reply = drain(&self.stream, HANDSHAKE_CAPACITY)?;
        if !reply.eq_ignore_ascii_case(CAPABILITIES_ACK.as_bytes()) {
            return Err(QmpError::Protocol(format!(
                "unexpected capabilities acknowledgment: {:?}",
                String::from_utf8_lossy(&reply)
            )));
        }
        debug!("capabilities negotiated");

        Ok(())
    }

    /// Dump the guest's CPU registers.
    pub fn query_registers(&mut self) -> Result<RegisterSet, QmpError> {
        let reply = self.execute(INFO_REGISTERS_COMMAND, REPLY_CAPACITY)?;
        Ok(RegisterSet::parse(&String::from_utf8_lossy(&reply))?)
    }

    /// List the guest's virtual CPUs.
    pub fn query_vcpus(&mut self) -> Result<VcpuList, QmpError> {
        let reply = self.execute(INFO_CPUS_COMMAND, REPLY_CAPACITY)?;
        Ok(VcpuList::parse(&String::from_utf8_lossy(&reply))?)
    }

    /// Path this connection was established over.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tear the connection down, surfacing close failures.
    ///
    /// Consuming `self` makes a double close unrepresentable.
    pub fn close(self) -> Result<(), QmpError> {
        debug!(path = %self.path.display(), "closing monitor connection");
        nix::unistd::close(self.stream.into_raw_fd())
            .map_err(|e| QmpError::Io(io::Error::from(e)))
    }

    /// Send one command and drain its reply.
    fn execute(&mut self, command: &str, capacity: usize) -> Result<Vec<u8>, QmpError> {
        self.stream.write_all(command.as_bytes())?;

        let reply = drain(&self.stream, capacity)?;
        if reply.is_empty() {
            return Err(QmpError::Protocol("monitor returned an empty reply".into()));
        }

        Ok(reply)
    }
}

fn starts_with_ignore_case(bytes: &[u8], prefix: &[u8]) -> bool {
    bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_prefix_match_is_case_insensitive() {
        assert!(starts_with_ignore_case(
            b"{\"qmp\": {\"version\": {}}}",
            GREETING.as_bytes()
        ));
        assert!(starts_with_ignore_case(
            b"{\"QMP\": {\"version\": {}}}",
            GREETING.as_bytes()
        ));
        assert!(!starts_with_ignore_case(b"{\"QM", GREETING.as_bytes()));
        assert!(!starts_with_ignore_case(b"hello", GREETING.as_bytes()));
    }

    #[test]
    fn connect_to_missing_socket_fails() {
        let err = QmpConnection::connect("/tmp/vmprobe-no-such-socket.sock").unwrap_err();
        assert!(matches!(err, QmpError::Connect { .. }));
    }

    #[test]
    fn connect_to_empty_path_fails() {
        let err = QmpConnection::connect("").unwrap_err();
        assert!(matches!(err, QmpError::Connect { .. }));
    }
}
