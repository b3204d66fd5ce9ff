// VMProbe - QEMU Monitor Introspection Client
// Copyright (C) 2026 VMProbe Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! QMP (QEMU Machine Protocol) client over a UNIX domain socket.
//!
//! Covers connection establishment, the greeting and capabilities
//! handshake, and the human-monitor introspection queries. Replies carry
//! no framing visible to a passthrough command, so they are collected by
//! a quiescence-based drain reader (see [`drain`]).

pub mod conn;
pub mod drain;

pub use conn::QmpConnection;

use std::io;
use std::path::PathBuf;

/// First bytes the monitor sends after accepting a control connection.
pub const GREETING: &str = "{\"QMP\":";

/// Command that moves a fresh connection into command mode.
pub const CAPABILITIES_COMMAND: &str = "{ \"execute\": \"qmp_capabilities\" }";

/// Acknowledgment of a successful capabilities negotiation.
pub const CAPABILITIES_ACK: &str = "{\"return\": {}}\r\n";

/// Human-monitor passthrough for the register dump.
pub const INFO_REGISTERS_COMMAND: &str = "{\"execute\": \"human-monitor-command\", \"arguments\": {\"command-line\": \"info registers\"}}";

/// Human-monitor passthrough for the CPU listing.
pub const INFO_CPUS_COMMAND: &str = "{\"execute\": \"human-monitor-command\", \"arguments\": {\"command-line\": \"info cpus\"}}";

/// Per-iteration readiness-wait timeout of the drain reader, in
/// milliseconds. One quiet interval ends a reply.
pub const POLL_TIMEOUT_MS: u16 = 10;

/// Largest single read per readiness event.
pub const READ_CHUNK: usize = 1024;

/// Reply capacity during the greeting and capabilities exchange.
pub const HANDSHAKE_CAPACITY: usize = 256;

/// Reply capacity for introspection queries.
pub const REPLY_CAPACITY: usize = 8 * 1024;

/// Errors surfaced by the protocol client.
#[derive(Debug, thiserror::Error)]
pub enum QmpError {
    #[error("failed to connect to {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("monitor i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] vmprobe_core::ParseError),
}
