//! Timing benchmark for ptrace operations against a running program
//!
//! Each run launches the target, then times six phases in order:
//!
//! | Phase         | Work                                                     |
//! |---------------|----------------------------------------------------------|
//! | Attach        | attach, wait, read `rip`, pick the breakpoint address    |
//! | Single Step   | `steps` × (single-step, wait)                            |
//! | Breakpoint    | `steps` × (set breakpoint, continue, wait, remove+rewind)|
//! | Registers     | `steps` × (read regs, `rax = rbx`, `rip = rsp`, write)   |
//! | Memory        | `steps` × (read word at `rsp`, add 5, write it back)     |
//! | Memory Search | `search_passes` × scan all mappings for `search_word`    |
//!
//! Times are whole milliseconds; `Total` runs from the start of the attach.
//! The register and memory phases clobber the tracee, which is killed
//! straight afterwards.

use crate::launch::{LaunchError, Session};
use crate::trace::{TraceError, TraceResult, Tracee, TraceeMemory, WORD_SIZE};
use log::{debug, info};
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

pub const PAGE_SIZE: u64 = 0x1000;

/// The word at index 6464 of the fixture's buffer holds 6464
pub const DEFAULT_SEARCH_WORD: u64 = 6464;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub runs: usize,
    pub steps: usize,
    pub search_passes: usize,
    pub search_word: u64,
    pub settle: Duration,
    /// Breakpoint at `page(rip) + offset`; `None` uses `rip` itself
    pub breakpoint_offset: Option<u64>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            runs: 30,
            steps: 1000,
            search_passes: 100,
            search_word: DEFAULT_SEARCH_WORD,
            settle: Duration::from_secs(1),
            breakpoint_offset: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("failed to write results: {0}")]
    Io(#[from] io::Error),
}

/// Phase timings of one run, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTimings {
    pub attach: u64,
    pub single_step: u64,
    pub breakpoint: u64,
    pub registers: u64,
    pub memory: u64,
    pub memory_search: u64,
    pub total: u64,
}

impl RunTimings {
    pub const CSV_HEADER: &'static str =
        "Attach,Single Step,Breakpoint,Registers,Memory,Memory Search,Total";

    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.attach,
            self.single_step,
            self.breakpoint,
            self.registers,
            self.memory,
            self.memory_search,
            self.total
        )
    }

    /// Build from cumulative checkpoints, each measured from the start
    fn from_checkpoints(checkpoints: [u64; 6]) -> Self {
        let [attach, step, bp, regs, mem, search] = checkpoints;
        RunTimings {
            attach,
            single_step: step.saturating_sub(attach),
            breakpoint: bp.saturating_sub(step),
            registers: regs.saturating_sub(bp),
            memory: mem.saturating_sub(regs),
            memory_search: search.saturating_sub(mem),
            total: search,
        }
    }
}

/// Where the breakpoint phase plants its breakpoint. Offsets wrap around
/// the address space.
pub fn breakpoint_address(ip: u64, offset: Option<u64>) -> u64 {
    match offset {
        Some(offset) => (ip / PAGE_SIZE * PAGE_SIZE).wrapping_add(offset),
        None => ip,
    }
}

/// Scan every mapping word by word for `target`; unreadable words are skipped
pub fn search_word(tracee: &Tracee, target: u64) -> TraceResult<Option<u64>> {
    for mapping in tracee.mappings()? {
        let mut address = mapping.start;
        while address < mapping.end {
            if let Ok(word) = tracee.read_word(address) {
                if word == target {
                    return Ok(Some(address));
                }
            }
            address += WORD_SIZE;
        }
    }
    Ok(None)
}

/// Launch `program` once and time every phase
pub fn run_once(
    program: &Path,
    args: &[OsString],
    config: &BenchConfig,
) -> Result<RunTimings, BenchError> {
    let mut session = Session::launch(program, args, config.settle)?;
    let attach_ms = session.attach_time().as_millis() as u64;
    let timings = time_phases(session.tracee_mut(), config, attach_ms);
    session.shutdown();
    Ok(timings?)
}

/// `attach_ms` is how long the session took to attach; every checkpoint
/// counts from the attach request.
fn time_phases(
    tracee: &mut Tracee,
    config: &BenchConfig,
    attach_ms: u64,
) -> TraceResult<RunTimings> {
    let start = Instant::now();
    let elapsed_ms = |start: Instant| attach_ms + start.elapsed().as_millis() as u64;
    let ip = tracee.instruction_pointer()?;
    let bp_address = breakpoint_address(ip, config.breakpoint_offset);
    debug!("ip 0x{:X}, breakpoint 0x{:X}", ip, bp_address);
    let attach_end = elapsed_ms(start);

    for _ in 0..config.steps {
        tracee.single_step()?;
        tracee.wait(true)?;
    }
    let step_end = elapsed_ms(start);

    for _ in 0..config.steps {
        tracee.create_breakpoint(bp_address)?;
        tracee.cont()?;
        tracee.wait(true)?;
        tracee.remove_breakpoint(bp_address, true)?;
    }
    let bp_end = elapsed_ms(start);

    for _ in 0..config.steps {
        let mut regs = tracee.regs()?;
        regs.rax = regs.rbx;
        regs.rip = regs.rsp;
        tracee.set_regs(&regs)?;
    }
    let regs_end = elapsed_ms(start);

    let sp = tracee.stack_pointer()?;
    for _ in 0..config.steps {
        let word = tracee.read_word(sp)?;
        tracee.write_word(sp, word.wrapping_add(5))?;
    }
    let mem_end = elapsed_ms(start);

    for pass in 0..config.search_passes {
        let found = search_word(tracee, config.search_word)?;
        if pass == 0 {
            match found {
                Some(address) => debug!("found {} at 0x{:X}", config.search_word, address),
                None => debug!("{} not found in any mapping", config.search_word),
            }
        }
    }
    let search_end = elapsed_ms(start);

    Ok(RunTimings::from_checkpoints([
        attach_end, step_end, bp_end, regs_end, mem_end, search_end,
    ]))
}

/// Run the benchmark `config.runs` times, writing a CSV row per run
pub fn run<W: Write>(
    program: &Path,
    args: &[OsString],
    config: &BenchConfig,
    out: &mut W,
) -> Result<Vec<RunTimings>, BenchError> {
    writeln!(out, "{}", RunTimings::CSV_HEADER)?;
    let mut results = Vec::with_capacity(config.runs);
    for run in 0..config.runs {
        info!("run {}/{}", run + 1, config.runs);
        let timings = run_once(program, args, config)?;
        writeln!(out, "{}", timings.csv_row())?;
        out.flush()?;
        debug!("{:?}", timings);
        results.push(timings);
    }
    Ok(results)
}
