//! Starting target programs
//!
//! - [`Session`]: spawn a program, let it settle into its workload, then
//!   attach and wait for the attach stop. Dropping a session kills the child.
//! - [`run_bounded`]: run a program untraced under an external timeout. This
//!   is how a non-terminating fixture is observed to still be running.

use crate::trace::{TraceError, Tracee};
use log::{debug, info};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How often [`run_bounded`] checks on the child
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to start {}: {source}", .program.display())]
    Spawn { program: PathBuf, source: io::Error },

    #[error("{} exited before it could be traced ({status})", .program.display())]
    ExitedEarly { program: PathBuf, status: ExitStatus },

    #[error(transparent)]
    Trace(#[from] TraceError),
}

fn spawn(program: &Path, args: &[OsString]) -> Result<Child, LaunchError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;
    info!("started {} as pid {}", program.display(), child.id());
    Ok(child)
}

fn kill_and_reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!("kill pid {}: {}", child.id(), err);
    }
    if let Err(err) = child.wait() {
        debug!("reap pid {}: {}", child.id(), err);
    }
}

/// A launched program with the tracer attached
#[derive(Debug)]
pub struct Session {
    child: Child,
    tracee: Tracee,
    attach_time: Duration,
    closed: bool,
}

impl Session {
    pub fn launch(program: &Path, args: &[OsString], settle: Duration) -> Result<Self, LaunchError> {
        let mut child = spawn(program, args)?;
        thread::sleep(settle);

        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(LaunchError::ExitedEarly {
                    program: program.to_path_buf(),
                    status,
                })
            }
            Ok(None) => {}
            Err(source) => {
                kill_and_reap(&mut child);
                return Err(LaunchError::Spawn {
                    program: program.to_path_buf(),
                    source,
                });
            }
        }

        let attach_start = Instant::now();
        let attached = Tracee::attach(child.id() as i32).and_then(|tracee| {
            let status = tracee.wait(true)?;
            debug!("attach stop: {:?}", status);
            Ok(tracee)
        });
        match attached {
            Ok(tracee) => Ok(Session {
                child,
                tracee,
                attach_time: attach_start.elapsed(),
                closed: false,
            }),
            Err(err) => {
                kill_and_reap(&mut child);
                Err(err.into())
            }
        }
    }

    pub fn pid(&self) -> i32 {
        self.tracee.pid()
    }

    /// Time from the attach request to the attach stop
    pub fn attach_time(&self) -> Duration {
        self.attach_time
    }

    pub fn tracee(&self) -> &Tracee {
        &self.tracee
    }

    pub fn tracee_mut(&mut self) -> &mut Tracee {
        &mut self.tracee
    }

    /// Kill the tracee, reap it and detach. Failures past the kill are only
    /// logged: the process is going away regardless.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(err) = self.tracee.terminate() {
            debug!("terminate: {}", err);
            kill_and_reap(&mut self.child);
        } else {
            match self.tracee.wait(true) {
                Ok(status) => debug!("pid {} finished: {:?}", self.tracee.pid(), status),
                Err(err) => debug!("wait after kill: {}", err),
            }
        }
        if let Err(err) = self.tracee.detach() {
            debug!("detach after kill: {}", err);
        }
        info!("terminated pid {}", self.tracee.pid());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Outcome of a time-limited run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundedOutcome {
    /// The program was still running at the deadline and has been killed
    StillRunning { elapsed: Duration },
    /// The program finished on its own
    Exited(ExitStatus),
}

/// Run `program` for at most `timeout`
pub fn run_bounded(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> Result<BoundedOutcome, LaunchError> {
    let mut child = spawn(program, args)?;
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(BoundedOutcome::Exited(status)),
            Ok(None) => {}
            Err(source) => {
                kill_and_reap(&mut child);
                return Err(LaunchError::Spawn {
                    program: program.to_path_buf(),
                    source,
                });
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            kill_and_reap(&mut child);
            info!(
                "pid {} still running after {} ms; killed",
                child.id(),
                elapsed.as_millis()
            );
            return Ok(BoundedOutcome::StillRunning { elapsed });
        }
        thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_run_of_finishing_program() {
        let args = [OsString::from("-c"), OsString::from("exit 3")];
        let outcome = run_bounded(Path::new("/bin/sh"), &args, Duration::from_secs(10)).unwrap();
        match outcome {
            BoundedOutcome::Exited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected exit, got {:?}", other),
        }
    }

    #[test]
    fn test_bounded_run_of_sleeping_program() {
        let args = [OsString::from("5")];
        let outcome =
            run_bounded(Path::new("/bin/sleep"), &args, Duration::from_millis(100)).unwrap();
        assert!(matches!(
            outcome,
            BoundedOutcome::StillRunning { elapsed } if elapsed >= Duration::from_millis(100)
        ));
    }

    #[test]
    fn test_missing_program() {
        let err = run_bounded(
            Path::new("/nonexistent/callchain"),
            &[],
            Duration::from_millis(10),
        )
        .unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }

    #[test]
    fn test_launch_reports_early_exit() {
        let err = Session::launch(Path::new("/bin/true"), &[], Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, LaunchError::ExitedEarly { .. }), "{}", err);
    }
}
