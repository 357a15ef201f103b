//! ptrace control of a running process
//!
//! [`Tracee`] wraps a pid the current process is tracing and exposes:
//! - execution control (single-step, continue, syscall stops, signals, wait)
//! - register access ([`Registers`], by value or by name)
//! - memory access, both word-wise through `PTRACE_PEEKDATA`/`POKEDATA` and
//!   in bulk through `process_vm_readv`/`writev`
//! - memory maps, the stack mapping and a raw stack dump
//! - software [`Breakpoint`]s, keyed by address
//! - frame-pointer [`Backtrace`]s
//!
//! Only Linux on x86_64 is supported.

pub mod backtrace;
pub mod breakpoint;
pub mod error;
pub mod maps;
pub mod memory;
pub mod regs;

pub use backtrace::{Backtrace, BacktraceFrame};
pub use breakpoint::Breakpoint;
pub use error::{TraceError, TraceResult};
pub use maps::MemoryMapping;
pub use memory::{TraceeMemory, WORD_SIZE};
pub use regs::Registers;

use libc::{c_int, c_void, pid_t};
use log::{debug, trace};
use rustc_hash::FxHashMap;
use std::io;
use std::ptr;

/// Issue a ptrace request that reports failure as `-1`/`errno`
macro_rules! ptrace {
    ($request:ident, $pid:expr, $addr:expr, $data:expr) => {{
        let pid: pid_t = $pid;
        // SAFETY: the request only touches the tracee, or the local buffer
        // passed as `data`, which outlives the call.
        let ret = unsafe {
            libc::ptrace(
                libc::$request,
                pid,
                $addr as *mut c_void,
                $data as *mut c_void,
            )
        };
        if ret == -1 {
            Err(TraceError::Request {
                request: stringify!($request),
                pid,
                source: io::Error::last_os_error(),
            })
        } else {
            Ok(ret)
        }
    }};
}

/// `SIGTRAP` is the tracer's own notification and is never forwarded
fn filter_signal(signal: c_int) -> c_int {
    if signal == libc::SIGTRAP {
        0
    } else {
        signal
    }
}

/// Result of waiting on the tracee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Exited(i32),
    Signaled(i32),
    Stopped(i32),
    Continued,
    /// Non-blocking wait with no state change
    StillAlive,
}

impl WaitStatus {
    /// Decode a raw `waitpid` status word
    pub fn from_raw(status: c_int) -> Self {
        if libc::WIFEXITED(status) {
            WaitStatus::Exited(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            WaitStatus::Signaled(libc::WTERMSIG(status))
        } else if libc::WIFSTOPPED(status) {
            WaitStatus::Stopped(libc::WSTOPSIG(status))
        } else {
            WaitStatus::Continued
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, WaitStatus::Stopped(_))
    }

    pub fn is_trap(&self) -> bool {
        *self == WaitStatus::Stopped(libc::SIGTRAP)
    }
}

/// A process traced by this one
#[derive(Debug)]
pub struct Tracee {
    pid: pid_t,
    attached: bool,
    breakpoints: FxHashMap<u64, Breakpoint>,
}

impl Tracee {
    /// Attach with `PTRACE_ATTACH`. The tracee is stopped asynchronously;
    /// call [`Tracee::wait`] before touching it.
    pub fn attach(pid: pid_t) -> TraceResult<Self> {
        ptrace!(PTRACE_ATTACH, pid, 0, 0).map_err(|err| match err {
            TraceError::Request { source, .. } => TraceError::Attach { pid, source },
            other => other,
        })?;
        debug!("attached to pid {}", pid);
        Ok(Self::from_attached(pid))
    }

    /// Wrap a pid that is already being traced
    pub fn from_attached(pid: pid_t) -> Self {
        Tracee {
            pid,
            attached: true,
            breakpoints: FxHashMap::default(),
        }
    }

    pub fn pid(&self) -> pid_t {
        self.pid
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // === Execution control ===

    pub fn single_step(&self) -> TraceResult<()> {
        ptrace!(PTRACE_SINGLESTEP, self.pid, 0, 0).map(drop)
    }

    pub fn cont(&self) -> TraceResult<()> {
        self.cont_with_signal(0)
    }

    /// Resume, delivering `signal` (a `SIGTRAP` is dropped)
    pub fn cont_with_signal(&self, signal: c_int) -> TraceResult<()> {
        ptrace!(PTRACE_CONT, self.pid, 0, filter_signal(signal) as usize).map(drop)
    }

    /// Resume until the next syscall entry or exit
    pub fn syscall(&self) -> TraceResult<()> {
        self.syscall_with_signal(0)
    }

    pub fn syscall_with_signal(&self, signal: c_int) -> TraceResult<()> {
        ptrace!(PTRACE_SYSCALL, self.pid, 0, filter_signal(signal) as usize).map(drop)
    }

    pub fn set_options(&self, options: c_int) -> TraceResult<()> {
        ptrace!(PTRACE_SETOPTIONS, self.pid, 0, options as usize).map(drop)
    }

    pub fn kill(&self, signal: c_int) -> TraceResult<()> {
        // SAFETY: plain syscall on a pid we own.
        if unsafe { libc::kill(self.pid, signal) } == -1 {
            return Err(TraceError::Signal {
                signal,
                pid: self.pid,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    pub fn terminate(&self) -> TraceResult<()> {
        self.kill(libc::SIGKILL)
    }

    pub fn wait(&self, blocking: bool) -> TraceResult<WaitStatus> {
        let options = if blocking { 0 } else { libc::WNOHANG };
        let mut status: c_int = 0;
        // SAFETY: status is a valid out-pointer for the duration of the call.
        let ret = unsafe { libc::waitpid(self.pid, &mut status, options) };
        match ret {
            -1 => Err(TraceError::Wait {
                pid: self.pid,
                source: io::Error::last_os_error(),
            }),
            0 => Ok(WaitStatus::StillAlive),
            _ => {
                let status = WaitStatus::from_raw(status);
                trace!("pid {}: {:?}", self.pid, status);
                Ok(status)
            }
        }
    }

    /// Detach once; later calls do nothing
    pub fn detach(&mut self) -> TraceResult<()> {
        if !self.attached {
            return Ok(());
        }
        self.attached = false;
        ptrace!(PTRACE_DETACH, self.pid, 0, 0).map(drop)
    }

    // === Registers ===

    pub fn regs(&self) -> TraceResult<Registers> {
        // SAFETY: user_regs_struct is plain integers; all-zero is valid.
        let mut raw: libc::user_regs_struct = unsafe { std::mem::zeroed() };
        ptrace!(
            PTRACE_GETREGS,
            self.pid,
            0,
            &mut raw as *mut libc::user_regs_struct
        )?;
        Ok(Registers::from(raw))
    }

    pub fn set_regs(&self, regs: &Registers) -> TraceResult<()> {
        let mut raw: libc::user_regs_struct = (*regs).into();
        ptrace!(
            PTRACE_SETREGS,
            self.pid,
            0,
            &mut raw as *mut libc::user_regs_struct
        )
        .map(drop)
    }

    pub fn reg(&self, name: &str) -> TraceResult<u64> {
        self.regs()?
            .get(name)
            .ok_or_else(|| TraceError::UnknownRegister(name.to_string()))
    }

    pub fn set_reg(&self, name: &str, value: u64) -> TraceResult<()> {
        let mut regs = self.regs()?;
        if !regs.set(name, value) {
            return Err(TraceError::UnknownRegister(name.to_string()));
        }
        self.set_regs(&regs)
    }

    pub fn instruction_pointer(&self) -> TraceResult<u64> {
        Ok(self.regs()?.rip)
    }

    pub fn set_instruction_pointer(&self, ip: u64) -> TraceResult<()> {
        let mut regs = self.regs()?;
        regs.rip = ip;
        self.set_regs(&regs)
    }

    pub fn stack_pointer(&self) -> TraceResult<u64> {
        Ok(self.regs()?.rsp)
    }

    pub fn frame_pointer(&self) -> TraceResult<u64> {
        Ok(self.regs()?.rbp)
    }

    // === Memory ===

    /// Bulk read through `process_vm_readv`. May return fewer than `len`
    /// bytes if the range runs into an unmapped page.
    pub fn read_mem(&self, address: u64, len: usize) -> TraceResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        if len == 0 {
            return Ok(buf);
        }
        let local = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: len,
        };
        let remote = libc::iovec {
            iov_base: address as *mut c_void,
            iov_len: len,
        };
        // SAFETY: local points at `len` writable bytes owned by `buf`.
        let n = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
        if n < 0 {
            return Err(TraceError::ReadMemory {
                address,
                source: io::Error::last_os_error(),
            });
        }
        if (n as usize) < len {
            debug!("short read at 0x{:X}: {} of {} bytes", address, n, len);
        }
        buf.truncate(n as usize);
        Ok(buf)
    }

    /// Bulk write through `process_vm_writev`; honours page protections
    pub fn write_mem(&self, address: u64, data: &[u8]) -> TraceResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let local = libc::iovec {
            iov_base: data.as_ptr() as *mut c_void,
            iov_len: data.len(),
        };
        let remote = libc::iovec {
            iov_base: address as *mut c_void,
            iov_len: data.len(),
        };
        // SAFETY: local points at `data`, which is only read.
        let n = unsafe { libc::process_vm_writev(self.pid, &local, 1, &remote, 1, 0) };
        if n < 0 || (n as usize) < data.len() {
            let source = if n < 0 {
                io::Error::last_os_error()
            } else {
                io::Error::new(io::ErrorKind::WriteZero, "short write")
            };
            return Err(TraceError::WriteMemory { address, source });
        }
        Ok(())
    }

    // === Mappings and stack ===

    pub fn mappings(&self) -> TraceResult<Vec<MemoryMapping>> {
        maps::read_process_mappings(self.pid)
    }

    pub fn find_stack(&self) -> TraceResult<MemoryMapping> {
        self.mappings()?
            .into_iter()
            .find(MemoryMapping::is_stack)
            .ok_or(TraceError::NoStack)
    }

    /// The first `words` words at and above the stack pointer, with addresses
    pub fn dump_stack(&self, words: usize) -> TraceResult<Vec<(u64, u64)>> {
        let sp = self.stack_pointer()?;
        (0..words as u64)
            .map(|i| {
                let address = sp.wrapping_add(i * WORD_SIZE);
                self.read_word(address).map(|word| (address, word))
            })
            .collect()
    }

    pub fn backtrace(&self, max_args: usize, max_depth: usize) -> TraceResult<Backtrace> {
        let regs = self.regs()?;
        Ok(backtrace::walk(self, regs.rip, regs.rbp, max_args, max_depth))
    }

    // === Breakpoints ===

    pub fn find_breakpoint(&self, address: u64) -> Option<&Breakpoint> {
        self.breakpoints.get(&address)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub fn create_breakpoint(&mut self, address: u64) -> TraceResult<()> {
        if self.breakpoints.contains_key(&address) {
            return Err(TraceError::BreakpointExists(address));
        }
        let mut bp = Breakpoint::new(address);
        bp.install(self)?;
        self.breakpoints.insert(address, bp);
        Ok(())
    }

    /// Uninstall and forget a breakpoint. With `restore_ip` the instruction
    /// pointer is moved back onto the breakpoint address, undoing the `int3`.
    pub fn remove_breakpoint(&mut self, address: u64, restore_ip: bool) -> TraceResult<()> {
        let mut bp = self
            .breakpoints
            .remove(&address)
            .ok_or(TraceError::BreakpointMissing(address))?;
        if let Err(err) = bp.uninstall(self) {
            self.breakpoints.insert(address, bp);
            return Err(err);
        }
        if restore_ip {
            self.set_instruction_pointer(address)?;
        }
        Ok(())
    }
}

impl TraceeMemory for Tracee {
    fn read_word(&self, address: u64) -> TraceResult<u64> {
        // PEEKDATA returns the word itself, so -1 is only an error if errno
        // was set.
        // SAFETY: errno is thread-local; PEEKDATA does not touch local memory.
        let word = unsafe {
            *libc::__errno_location() = 0;
            libc::ptrace(
                libc::PTRACE_PEEKDATA,
                self.pid,
                address as *mut c_void,
                ptr::null_mut::<c_void>(),
            )
        };
        if word == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error().unwrap_or(0) != 0 {
                return Err(TraceError::ReadMemory {
                    address,
                    source: err,
                });
            }
        }
        Ok(word as u64)
    }

    fn write_word(&mut self, address: u64, value: u64) -> TraceResult<()> {
        ptrace!(PTRACE_POKEDATA, self.pid, address, value as usize)
            .map(drop)
            .map_err(|err| match err {
                TraceError::Request { source, .. } => TraceError::WriteMemory { address, source },
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigtrap_is_never_forwarded() {
        assert_eq!(filter_signal(libc::SIGTRAP), 0);
        assert_eq!(filter_signal(libc::SIGINT), libc::SIGINT);
        assert_eq!(filter_signal(0), 0);
    }

    #[test]
    fn test_wait_status_decoding() {
        assert_eq!(WaitStatus::from_raw(3 << 8), WaitStatus::Exited(3));
        assert_eq!(WaitStatus::from_raw(libc::SIGKILL), WaitStatus::Signaled(libc::SIGKILL));

        let trap = WaitStatus::from_raw((libc::SIGTRAP << 8) | 0x7f);
        assert_eq!(trap, WaitStatus::Stopped(libc::SIGTRAP));
        assert!(trap.is_trap());
        assert!(trap.is_stopped());

        let stop = WaitStatus::from_raw((libc::SIGSTOP << 8) | 0x7f);
        assert!(stop.is_stopped());
        assert!(!stop.is_trap());

        assert_eq!(WaitStatus::from_raw(0xffff), WaitStatus::Continued);
    }

    #[test]
    fn test_attach_to_missing_process_fails() {
        // pid_max never reaches i32::MAX
        let err = Tracee::attach(i32::MAX).unwrap_err();
        assert!(matches!(err, TraceError::Attach { pid, .. } if pid == i32::MAX));
    }

    #[test]
    fn test_detach_is_idempotent_once_marked() {
        let mut tracee = Tracee::from_attached(i32::MAX);
        assert!(tracee.detach().is_err());
        assert!(!tracee.is_attached());
        assert!(tracee.detach().is_ok());
    }

    #[test]
    fn test_remove_unknown_breakpoint() {
        let mut tracee = Tracee::from_attached(i32::MAX);
        let err = tracee.remove_breakpoint(0x1000, true).unwrap_err();
        assert!(matches!(err, TraceError::BreakpointMissing(0x1000)));
    }
}
