//! # Introduction
//!
//! callprobe is a small ptrace toolkit built around a fixture program,
//! `callchain`, that nests four calls `a → b → c → d` and then spins forever
//! in `d` over a heap buffer. A running `callchain` gives a tracer a known
//! stack to walk and known memory to search.
//!
//! ## Layout
//!
//! ```text
//! fixture → callchain binary ← Session (launch) ← trace::Tracee
//!                                   ↑
//!                     bench · inspect · snapshot → ui
//! ```
//!
//! 1. [`fixture`]: the call chain and its workload. Portable.
//! 2. `trace`: attach, step, registers, memory, maps, breakpoints and
//!    frame-pointer backtraces over `ptrace(2)`.
//! 3. `launch`: spawn a program and attach, or run it under a timeout.
//! 4. `bench`: time each ptrace operation over many runs and emit CSV.
//! 5. `inspect`: scripted checks printed as text reports.
//! 6. `snapshot` and `ui`: the live `watch` view; not part of the stable
//!    library API.
//!
//! Everything past [`fixture`] needs Linux on x86_64.

pub mod fixture;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod bench;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod inspect;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod launch;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod snapshot;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod trace;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod ui;
