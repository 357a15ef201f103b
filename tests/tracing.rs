// Tracer tests against a live callchain process
//
// These attach with ptrace and are skipped by default: run them with
// `cargo test -- --ignored` where ptrace of child processes is allowed.

#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use std::path::Path;
use std::time::Duration;

use callprobe::bench::{self, BenchConfig, RunTimings};
use callprobe::inspect::{self, Check};
use callprobe::launch::Session;
use callprobe::trace::{TraceeMemory, WORD_SIZE};

const CALLCHAIN: &str = env!("CARGO_BIN_EXE_callchain");
const SETTLE: Duration = Duration::from_millis(300);

fn launch() -> Session {
    let _ = env_logger::builder().is_test(true).try_init();
    Session::launch(Path::new(CALLCHAIN), &[], SETTLE).expect("launch callchain")
}

#[test]
#[ignore = "needs ptrace permission"]
fn test_registers_and_single_step() {
    let session = launch();
    let tracee = session.tracee();

    let regs = tracee.regs().expect("read registers");
    assert_eq!(tracee.reg("RIP").expect("rip by name"), regs.rip);
    assert!(tracee.reg("xmm0").is_err());

    let code = tracee
        .mappings()
        .expect("mappings")
        .into_iter()
        .find(|m| m.contains(regs.rip))
        .expect("rip lies in a mapping");
    assert!(code.permissions.contains('x'));

    tracee.single_step().expect("single step");
    assert!(tracee.wait(true).expect("wait").is_trap());
    session.shutdown();
}

#[test]
#[ignore = "needs ptrace permission"]
fn test_breakpoint_hit_and_rewind() {
    let mut session = launch();
    let tracee = session.tracee_mut();

    let address = tracee.instruction_pointer().expect("rip");
    let original = tracee.read_word(address).expect("code word");
    tracee.create_breakpoint(address).expect("set breakpoint");
    assert_eq!(
        tracee.read_word(address).expect("patched word"),
        (original & !0xFF) | 0xCC
    );

    tracee.cont().expect("continue");
    assert!(tracee.wait(true).expect("wait").is_trap());
    assert_eq!(tracee.instruction_pointer().expect("rip"), address + 1);

    tracee.remove_breakpoint(address, true).expect("remove breakpoint");
    assert_eq!(tracee.instruction_pointer().expect("rip"), address);
    assert_eq!(tracee.read_word(address).expect("restored word"), original);
    session.shutdown();
}

#[test]
#[ignore = "needs ptrace permission"]
fn test_string_and_partial_word_writes() {
    let mut session = launch();
    let tracee = session.tracee_mut();

    // Below the red zone, so the spinning leaf never touches it
    let scratch = tracee.stack_pointer().expect("rsp") - 256;
    let saved = tracee.read_mem(scratch, 16).expect("save scratch");

    tracee.write_mem(scratch, b"hi there\0").expect("write string");
    assert_eq!(tracee.read_cstring(scratch).expect("read string"), "hi there");

    tracee.write_bytes(scratch, b"XYZ").expect("partial write");
    assert_eq!(tracee.read_bytes(scratch, 8).expect("read word"), b"XYZthere");
    assert_eq!(tracee.read_mem(scratch, 9).expect("bulk read"), b"XYZthere\0");

    tracee.write_mem(scratch, &saved).expect("restore scratch");
    session.shutdown();
}

#[test]
#[ignore = "needs ptrace permission"]
fn test_syscall_resume_and_options() {
    let session = launch();
    let tracee = session.tracee();

    tracee.set_options(0).expect("clear options");
    // The spinning leaf makes no syscalls; stop it again with SIGSTOP
    tracee.syscall().expect("resume to next syscall");
    std::thread::sleep(Duration::from_millis(20));
    tracee.kill(libc::SIGSTOP).expect("stop");
    let status = tracee.wait(true).expect("wait");
    assert!(status.is_stopped(), "{:?}", status);
    assert!(tracee.regs().is_ok());
    session.shutdown();
}

#[test]
#[ignore = "needs ptrace permission"]
fn test_buffer_is_visible_in_the_heap() {
    let session = launch();
    let tracee = session.tracee();

    let heap = tracee
        .mappings()
        .expect("mappings")
        .into_iter()
        .find(|m| m.pathname == "[heap]")
        .expect("heap mapping");
    let bytes = tracee.read_mem(heap.start, heap.len() as usize).expect("read heap");
    let words: Vec<u64> = bytes
        .chunks_exact(WORD_SIZE as usize)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect();

    let found = words
        .windows(3)
        .any(|w| w == [6463, 6464, 6465]);
    assert!(found, "buffer contents not found in the heap");
    session.shutdown();
}

#[test]
#[ignore = "needs ptrace permission"]
fn test_backtrace_reaches_through_the_chain() {
    let session = launch();
    let backtrace = session.tracee().backtrace(6, 25).expect("backtrace");
    // d, c, b, a at least
    assert!(backtrace.depth() >= 4, "{}", backtrace);
    assert!(session.tracee().find_stack().is_ok());
    session.shutdown();
}

#[test]
#[ignore = "needs ptrace permission"]
fn test_every_inspect_check_passes() {
    let _ = env_logger::builder().is_test(true).try_init();
    for check in Check::ALL {
        let report = inspect::run(check, Path::new(CALLCHAIN), &[], SETTLE, None)
            .expect("check runs");
        assert!(report.passed(), "{}", report);
    }
}

#[test]
#[ignore = "needs ptrace permission"]
fn test_bench_writes_a_row_per_run() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = BenchConfig {
        runs: 2,
        steps: 10,
        search_passes: 1,
        settle: SETTLE,
        ..BenchConfig::default()
    };
    let mut out = Vec::new();
    let results = bench::run(Path::new(CALLCHAIN), &[], &config, &mut out).expect("bench");

    assert_eq!(results.len(), 2);
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], RunTimings::CSV_HEADER);
    assert_eq!(lines.len(), 3);
    for timings in results {
        assert!(timings.total >= timings.attach);
    }
}
