//! Known-depth call chain used as a target for stack-unwinding tools
//!
//! The chain is `a → b → c → d`. Each link forwards its integer arguments
//! (`b` drops `z`), so a debugger stopped inside the workload sees exactly
//! four frames above `main`. The leaf [`d`] allocates a [`BUFFER_LEN`]-element
//! buffer holding its own indices and then spins on a [`Recurrence`].
//!
//! # Instrumentation
//!
//! Every function takes an [`Instrument`] that is told about frame entry, the
//! populated buffer, and each loop iteration. Only the instrument can end the
//! loop, by returning [`ControlFlow::Break`] from [`Instrument::iteration`].
//! The `callchain` binary passes [`Unbounded`], so it never returns and the
//! buffer is never released. When an instrument does halt, the buffer is
//! dropped before [`d`] returns.
//!
//! # Frames
//!
//! The chain functions are `#[inline(never)]` and pass their callee's result
//! through [`black_box`] so neither inlining nor sibling-call optimisation can
//! fold a frame away.

pub mod workload;

use std::hint::black_box;
use std::ops::ControlFlow;

pub use workload::{populate_buffer, Recurrence, BUFFER_LEN, SEED_A, SEED_B};

/// First argument passed by the entry point
pub const X: i32 = 10;
/// Second argument passed by the entry point
pub const Y: i32 = 11;
/// Third argument passed by the entry point (dropped by `b`)
pub const Z: i32 = 50;

/// One link of the call chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    A,
    B,
    C,
    D,
}

impl Frame {
    /// Depth below `main` (which is depth 0)
    pub fn depth(self) -> usize {
        match self {
            Frame::A => 1,
            Frame::B => 2,
            Frame::C => 3,
            Frame::D => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Frame::A => "a",
            Frame::B => "b",
            Frame::C => "c",
            Frame::D => "d",
        }
    }
}

/// Observer for the call chain and the leaf workload
pub trait Instrument {
    /// Called on entry to each chain function with the arguments it received
    fn enter(&mut self, _frame: Frame, _args: &[i32]) {}

    /// Called once, right after the buffer has been populated
    fn populated(&mut self, _buffer: &[u64]) {}

    /// Called after every recurrence step. `count` starts at 1.
    fn iteration(&mut self, _count: u64, _state: &Recurrence) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Instrument that observes nothing and never halts the loop
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl Instrument for Unbounded {}

/// Where the workload stood when an instrument halted it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Halted {
    pub iterations: u64,
    pub state: Recurrence,
}

#[inline(never)]
pub fn a<I: Instrument + ?Sized>(x: i32, y: i32, z: i32, instrument: &mut I) -> Halted {
    instrument.enter(Frame::A, &[x, y, z]);
    black_box(b(x, y, z, instrument))
}

#[inline(never)]
pub fn b<I: Instrument + ?Sized>(x: i32, y: i32, z: i32, instrument: &mut I) -> Halted {
    instrument.enter(Frame::B, &[x, y, z]);
    black_box(c(x, y, instrument))
}

#[inline(never)]
pub fn c<I: Instrument + ?Sized>(x: i32, y: i32, instrument: &mut I) -> Halted {
    instrument.enter(Frame::C, &[x, y]);
    black_box(d(x, y, instrument))
}

/// The workload leaf. Returns only if `instrument` halts the loop.
#[inline(never)]
pub fn d<I: Instrument + ?Sized>(x: i32, y: i32, instrument: &mut I) -> Halted {
    instrument.enter(Frame::D, &[x, y]);

    // External tools search the tracee for these values.
    let buffer = black_box(populate_buffer(BUFFER_LEN));
    instrument.populated(&buffer);

    let mut state = black_box(Recurrence::new());
    let mut iterations: u64 = 0;
    loop {
        state.step();
        state = black_box(state);
        iterations = iterations.wrapping_add(1);
        if instrument.iteration(iterations, &state).is_break() {
            break;
        }
    }

    drop(buffer);
    Halted { iterations, state }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records chain events and halts after a fixed number of iterations
    struct Recorder {
        entered: Vec<(Frame, Vec<i32>)>,
        buffer_ok: Option<bool>,
        seen: Vec<Recurrence>,
        limit: u64,
    }

    impl Recorder {
        fn halting_after(limit: u64) -> Self {
            Recorder {
                entered: Vec::new(),
                buffer_ok: None,
                seen: Vec::new(),
                limit,
            }
        }
    }

    impl Instrument for Recorder {
        fn enter(&mut self, frame: Frame, args: &[i32]) {
            self.entered.push((frame, args.to_vec()));
        }

        fn populated(&mut self, buffer: &[u64]) {
            let ok = buffer.len() == BUFFER_LEN
                && buffer.iter().enumerate().all(|(i, v)| *v == i as u64);
            self.buffer_ok = Some(ok);
        }

        fn iteration(&mut self, count: u64, state: &Recurrence) -> ControlFlow<()> {
            self.seen.push(*state);
            if count >= self.limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    }

    #[test]
    fn test_chain_reaches_depth_four() {
        let mut recorder = Recorder::halting_after(1);
        a(X, Y, Z, &mut recorder);

        let frames: Vec<Frame> = recorder.entered.iter().map(|(f, _)| *f).collect();
        assert_eq!(frames, vec![Frame::A, Frame::B, Frame::C, Frame::D]);
        let depths: Vec<usize> = frames.iter().map(|f| f.depth()).collect();
        assert_eq!(depths, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_arguments_pass_through_and_z_is_dropped() {
        let mut recorder = Recorder::halting_after(1);
        a(10, 11, 50, &mut recorder);

        assert_eq!(recorder.entered[0].1, vec![10, 11, 50]);
        assert_eq!(recorder.entered[1].1, vec![10, 11, 50]);
        assert_eq!(recorder.entered[2].1, vec![10, 11]);
        assert_eq!(recorder.entered[3].1, vec![10, 11]);
    }

    #[test]
    fn test_buffer_is_populated_before_the_loop() {
        let mut recorder = Recorder::halting_after(3);
        a(X, Y, Z, &mut recorder);
        assert_eq!(recorder.buffer_ok, Some(true));
    }

    #[test]
    fn test_halted_state_matches_recurrence() {
        let mut recorder = Recorder::halting_after(5);
        let halted = a(X, Y, Z, &mut recorder);

        let mut expected = Recurrence::new();
        for _ in 0..5 {
            expected.step();
        }
        assert_eq!(halted.iterations, 5);
        assert_eq!(halted.state, expected);
        assert_eq!(recorder.seen.len(), 5);
        assert!((recorder.seen[0].a - 7.0205).abs() < 1e-12);
    }

    #[test]
    fn test_leaf_runs_until_saturation_when_allowed() {
        let mut recorder = Recorder::halting_after(200);
        let halted = d(X, Y, &mut recorder);
        assert!(halted.state.is_saturated());
        assert_eq!(recorder.entered.len(), 1);
        assert_eq!(recorder.entered[0].0, Frame::D);
    }

    #[test]
    fn test_frame_names() {
        let names: Vec<&str> = [Frame::A, Frame::B, Frame::C, Frame::D]
            .iter()
            .map(|f| f.name())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }
}
