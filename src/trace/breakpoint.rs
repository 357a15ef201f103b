//! Software breakpoints
//!
//! Installing a breakpoint saves the word at its address and replaces the low
//! byte with `int3`. When the tracee executes it, it stops with `SIGTRAP` and
//! its instruction pointer one byte past the breakpoint; the owner of the
//! breakpoint rewinds it after uninstalling.

use super::error::{TraceError, TraceResult};
use super::memory::TraceeMemory;

/// The x86 `int3` opcode
pub const INT3: u8 = 0xCC;

/// A breakpoint at a single code address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    address: u64,
    saved_word: u64,
    installed: bool,
}

impl Breakpoint {
    pub fn new(address: u64) -> Self {
        Breakpoint {
            address,
            saved_word: 0,
            installed: false,
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// The original word, valid once installed
    pub fn saved_word(&self) -> u64 {
        self.saved_word
    }

    /// Patch `int3` into the code at the breakpoint address
    pub fn install<M: TraceeMemory + ?Sized>(&mut self, memory: &mut M) -> TraceResult<()> {
        let word = memory.read_word(self.address)?;
        memory.write_word(self.address, (word & !0xFF) | INT3 as u64)?;
        self.saved_word = word;
        self.installed = true;
        Ok(())
    }

    /// Restore the original code
    pub fn uninstall<M: TraceeMemory + ?Sized>(&mut self, memory: &mut M) -> TraceResult<()> {
        if !self.installed {
            return Err(TraceError::BreakpointNotInstalled(self.address));
        }
        memory.write_word(self.address, self.saved_word)?;
        self.installed = false;
        Ok(())
    }
}
