pub mod registers;
pub mod vcpu;

pub use registers::{Arch, RegisterSet};
pub use vcpu::{Vcpu, VcpuList, VcpuState};

/// Errors raised while extracting typed values out of monitor reply text.
///
/// Both parsers are all-or-nothing: the first missing or malformed field
/// aborts the parse and nothing partial is handed back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("register {0} not found in monitor output")]
    MissingRegister(&'static str),
    #[error("register {0} has a malformed value")]
    MalformedRegister(&'static str),
    #[error("no CPU entries in monitor output")]
    MissingCpuList,
    #[error("malformed CPU entry: {0:?}")]
    MalformedCpuEntry(String),
}
