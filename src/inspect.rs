//! Scripted checks against a launched program
//!
//! Each check drives a [`Session`] through one area of the tracer and records
//! what it saw in a [`Report`]: plain lines for the reader plus named
//! expectations that decide whether the check passed.

use crate::bench::{breakpoint_address, PAGE_SIZE};
use crate::launch::{LaunchError, Session};
use crate::trace::{TraceError, TraceResult, Tracee, TraceeMemory, WORD_SIZE};
use log::info;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Largest window the memory check reads from a mapping
const MEMORY_WINDOW: u64 = PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Check {
    /// Registers and single-stepping
    Control,
    /// Mappings and memory reads/writes
    Memory,
    /// Breakpoint hit and rewind
    Breakpoint,
    /// Stack mapping, stack words and backtrace
    Stack,
}

impl Check {
    pub const ALL: [Check; 4] = [Check::Control, Check::Memory, Check::Breakpoint, Check::Stack];

    pub fn name(self) -> &'static str {
        match self {
            Check::Control => "control",
            Check::Memory => "memory",
            Check::Breakpoint => "breakpoint",
            Check::Stack => "stack",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub check: Check,
    pub lines: Vec<String>,
    /// `(description, held)` for every expectation
    pub outcomes: Vec<(String, bool)>,
}

impl Report {
    pub fn new(check: Check) -> Self {
        Report {
            check,
            lines: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn note(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn expect(&mut self, description: impl Into<String>, held: bool) {
        self.outcomes.push((description.into(), held));
    }

    /// True when every expectation held
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|(_, held)| *held)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.check)?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        for (description, held) in &self.outcomes {
            let mark = if *held { "ok" } else { "FAILED" };
            writeln!(f, "[{}] {}", mark, description)?;
        }
        write!(
            f,
            "{} {}",
            self.check,
            if self.passed() { "passed" } else { "failed" }
        )
    }
}

/// Launch `program`, run `check` on it and kill it again
pub fn run(
    check: Check,
    program: &Path,
    args: &[OsString],
    settle: Duration,
    breakpoint_offset: Option<u64>,
) -> Result<Report, LaunchError> {
    let mut session = Session::launch(program, args, settle)?;
    info!("running {} check on pid {}", check, session.pid());
    let report = run_on(check, session.tracee_mut(), breakpoint_offset);
    session.shutdown();
    Ok(report?)
}

/// Run `check` on an already stopped tracee
pub fn run_on(
    check: Check,
    tracee: &mut Tracee,
    breakpoint_offset: Option<u64>,
) -> TraceResult<Report> {
    match check {
        Check::Control => control(tracee),
        Check::Memory => memory(tracee),
        Check::Breakpoint => breakpoint(tracee, breakpoint_offset),
        Check::Stack => stack(tracee),
    }
}

pub fn control(tracee: &mut Tracee) -> TraceResult<Report> {
    let mut report = Report::new(Check::Control);

    let ip = tracee.instruction_pointer()?;
    report.note(format!("Instruction pointer: 0x{:X}", ip));
    let by_name = tracee.reg("rip")?;
    report.expect("rip by name matches the register set", by_name == ip);

    for _ in 0..10 {
        tracee.single_step()?;
        tracee.wait(true)?;
        report.note(format!("Instruction pointer: 0x{:X}", tracee.instruction_pointer()?));
    }

    tracee.set_reg("rcx", 0x123)?;
    let rcx = tracee.reg("rcx")?;
    report.note(format!("rcx: 0x{:X}", rcx));
    report.expect("rcx reads back 0x123", rcx == 0x123);

    Ok(report)
}

pub fn memory(tracee: &mut Tracee) -> TraceResult<Report> {
    let mut report = Report::new(Check::Memory);

    let mappings = tracee.mappings()?;
    for mapping in &mappings {
        report.note(mapping.to_string());
    }
    let first = mappings
        .first()
        .ok_or(TraceError::NoMappings(tracee.pid()))?;
    let start = first.start;
    let window = first.len().min(MEMORY_WINDOW) as usize;

    let word = tracee.read_word(start)?;
    report.note(format!("Word at 0x{:X}: 0x{:016X}", start, word));
    tracee.write_word(start, word.wrapping_add(1))?;
    let modified = tracee.read_word(start)?;
    report.expect("word write is visible", modified == word.wrapping_add(1));
    tracee.write_word(start, word)?;

    let peeked = tracee.read_bytes(start, window)?;
    let bulk = tracee.read_mem(start, window)?;
    report.note(format!("Read {} bytes both ways", window));
    report.expect("word-wise and bulk reads agree", peeked == bulk);

    let original = peeked.first().copied().unwrap_or(0);
    tracee.write_bytes(start, &[original ^ 0xFF])?;
    let reread = tracee.read_bytes(start, WORD_SIZE as usize)?;
    report.expect("byte write is visible", reread.first() == Some(&(original ^ 0xFF)));
    report.expect(
        "rest of the word is untouched",
        reread.get(1..) == peeked.get(1..WORD_SIZE as usize),
    );
    tracee.write_bytes(start, &[original])?;

    Ok(report)
}

pub fn breakpoint(tracee: &mut Tracee, offset: Option<u64>) -> TraceResult<Report> {
    let mut report = Report::new(Check::Breakpoint);

    let ip = tracee.instruction_pointer()?;
    let address = breakpoint_address(ip, offset);
    report.note(format!("Instruction pointer: 0x{:X}", ip));
    report.note(format!("Breakpoint: 0x{:X}", address));

    tracee.create_breakpoint(address)?;
    tracee.cont()?;
    let status = tracee.wait(true)?;
    report.expect("tracee stopped on a trap", status.is_trap());
    let hit = tracee.instruction_pointer()?;
    report.note(format!("Stopped at: 0x{:X}", hit));
    report.expect("rip is one past the breakpoint", hit == address.wrapping_add(1));

    tracee.remove_breakpoint(address, true)?;
    let rewound = tracee.instruction_pointer()?;
    report.expect("rip rewound onto the breakpoint", rewound == address);
    report.expect("breakpoint table is empty", tracee.breakpoints().next().is_none());

    Ok(report)
}

pub fn stack(tracee: &mut Tracee) -> TraceResult<Report> {
    let mut report = Report::new(Check::Stack);

    let stack = tracee.find_stack()?;
    report.note(format!("Stack mapping: {}", stack));
    let sp = tracee.stack_pointer()?;
    report.expect("stack pointer lies in the stack mapping", stack.contains(sp));

    for (address, word) in tracee.dump_stack(6)? {
        report.note(format!("0x{:X}: {:016X}", address, word));
    }

    let backtrace = tracee.backtrace(6, 25)?;
    for frame in &backtrace.frames {
        report.note(frame.to_string());
    }
    report.expect("backtrace has at least one frame", backtrace.depth() > 0);

    Ok(report)
}
