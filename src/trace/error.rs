//! Error type for tracee control
//!
//! Every ptrace, wait and memory failure carries the pid or address it was
//! about, plus the OS error that caused it.

use std::io;

/// Errors raised while controlling or inspecting a traced process
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("could not attach to pid {pid}: {source}")]
    Attach { pid: i32, source: io::Error },

    #[error("{request} failed for pid {pid}: {source}")]
    Request {
        request: &'static str,
        pid: i32,
        source: io::Error,
    },

    #[error("waiting on pid {pid} failed: {source}")]
    Wait { pid: i32, source: io::Error },

    #[error("could not send signal {signal} to pid {pid}: {source}")]
    Signal {
        signal: i32,
        pid: i32,
        source: io::Error,
    },

    #[error("error reading memory at 0x{address:X}: {source}")]
    ReadMemory { address: u64, source: io::Error },

    #[error("error writing memory at 0x{address:X}: {source}")]
    WriteMemory { address: u64, source: io::Error },

    #[error("unknown register '{0}'")]
    UnknownRegister(String),

    #[error("breakpoint already exists at 0x{0:X}")]
    BreakpointExists(u64),

    #[error("no breakpoint at 0x{0:X}")]
    BreakpointMissing(u64),

    #[error("breakpoint at 0x{0:X} is not installed")]
    BreakpointNotInstalled(u64),

    #[error("failed to open memory maps file for pid {pid}: {source}")]
    MapsUnavailable { pid: i32, source: io::Error },

    #[error("unrecognised memory map line: '{0}'")]
    MapsParse(String),

    #[error("pid {0} has no memory mappings")]
    NoMappings(i32),

    #[error("no stack mapping found")]
    NoStack,
}

pub type TraceResult<T> = Result<T, TraceError>;
