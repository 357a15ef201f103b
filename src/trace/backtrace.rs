//! Frame-pointer backtraces
//!
//! The walk follows the saved `rbp` chain. Each frame looks like:
//!
//! ```text
//! fp + 16 + 8*i   stack-passed argument i (a guess; see below)
//! fp + 8          return address into the caller
//! fp              caller's saved frame pointer
//! ```
//!
//! The number of arguments is guessed from the distance to the caller's frame:
//! `(next_fp - fp) / 8 - 2`, clamped to `max_args`. Names are left unresolved.

use super::memory::{TraceeMemory, WORD_SIZE};
use std::fmt;

/// Display name for frames without a resolved symbol
pub const UNKNOWN_FRAME: &str = "???";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceFrame {
    pub ip: u64,
    pub name: Option<String>,
    pub arguments: Vec<u64>,
}

impl BacktraceFrame {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_FRAME)
    }
}

impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IP: 0x{:X}, Args: {:?}", self.ip, self.arguments)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace {
    pub frames: Vec<BacktraceFrame>,
    /// The walk stopped at `max_depth` rather than at the end of the chain
    pub truncated: bool,
}

impl Backtrace {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl fmt::Display for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{}", frame)?;
        }
        if self.truncated {
            writeln!(f, "...")?;
        }
        Ok(())
    }
}

/// Estimate how many argument words sit between `fp` and the caller's frame
pub fn guess_argument_count(fp: u64, next_fp: u64, max_args: usize) -> usize {
    if next_fp <= fp {
        return 0;
    }
    let words = (next_fp - fp) / WORD_SIZE;
    (words.saturating_sub(2) as usize).min(max_args)
}

/// Walk the frame-pointer chain starting at `ip`/`fp`
pub fn walk<M: TraceeMemory + ?Sized>(
    memory: &M,
    mut ip: u64,
    mut fp: u64,
    max_args: usize,
    max_depth: usize,
) -> Backtrace {
    let mut backtrace = Backtrace::default();

    for depth in 0.. {
        if depth >= max_depth {
            backtrace.truncated = true;
            break;
        }

        let next_fp = match memory.read_word(fp) {
            Ok(word) => word,
            Err(err) => {
                log::trace!("backtrace stopped at depth {}: {}", depth, err);
                break;
            }
        };

        let n_args = guess_argument_count(fp, next_fp, max_args);
        let arguments = (0..n_args as u64)
            .map(|i| {
                let address = fp.wrapping_add(2 * WORD_SIZE + i * WORD_SIZE);
                memory.read_word(address).unwrap_or(0)
            })
            .collect();
        backtrace.frames.push(BacktraceFrame {
            ip,
            name: None,
            arguments,
        });

        ip = memory.read_word(fp.wrapping_add(WORD_SIZE)).unwrap_or(0);
        if ip == u64::MAX {
            break;
        }
        fp = next_fp;
    }

    backtrace
}
