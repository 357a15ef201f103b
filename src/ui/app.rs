//! Main TUI application state and logic

use crate::launch::Session;
use crate::snapshot::{CaptureLimits, Snapshot, SnapshotHistory};
use crate::trace::{TraceError, TraceResult, WaitStatus};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::io;
use std::thread;
use std::time::Duration;

/// How long `c` lets the tracee run before stopping it again
const CONTINUE_SLICE: Duration = Duration::from_millis(50);

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Registers,
    Backtrace,
    Stack,
    Maps,
}

impl FocusedPane {
    /// Move focus to the next pane (clockwise: registers -> backtrace -> stack -> maps)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Registers => FocusedPane::Backtrace,
            FocusedPane::Backtrace => FocusedPane::Stack,
            FocusedPane::Stack => FocusedPane::Maps,
            FocusedPane::Maps => FocusedPane::Registers,
        }
    }

    /// Move focus to the previous pane (counter-clockwise)
    pub fn prev(self) -> Self {
        match self {
            FocusedPane::Registers => FocusedPane::Maps,
            FocusedPane::Backtrace => FocusedPane::Registers,
            FocusedPane::Stack => FocusedPane::Backtrace,
            FocusedPane::Maps => FocusedPane::Stack,
        }
    }
}

/// Result of stepping the tracee several times
#[derive(Debug, Default)]
struct StepRun {
    stepped: usize,
    /// Stop status after the last successful step
    last: Option<WaitStatus>,
    /// Exit or kill status if the tracee stopped existing
    finished: Option<WaitStatus>,
    error: Option<TraceError>,
}

/// Call `step` up to `n` times, stopping early on exit or error. Steps that
/// succeeded before a failure still count.
fn run_steps<F>(n: usize, mut step: F) -> StepRun
where
    F: FnMut() -> TraceResult<WaitStatus>,
{
    let mut run = StepRun::default();
    for _ in 0..n {
        match step() {
            Ok(status) if status.is_stopped() => {
                run.stepped += 1;
                run.last = Some(status);
            }
            Ok(status) => {
                run.finished = Some(status);
                break;
            }
            Err(err) => {
                run.error = Some(err);
                break;
            }
        }
    }
    run
}

/// Per-pane scroll offsets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollOffsets {
    pub registers: usize,
    pub backtrace: usize,
    pub stack: usize,
    pub maps: usize,
}

impl ScrollOffsets {
    fn get_mut(&mut self, pane: FocusedPane) -> &mut usize {
        match pane {
            FocusedPane::Registers => &mut self.registers,
            FocusedPane::Backtrace => &mut self.backtrace,
            FocusedPane::Stack => &mut self.stack,
            FocusedPane::Maps => &mut self.maps,
        }
    }
}

/// The main application state
pub struct App {
    session: Session,

    /// Snapshots taken after every live action
    pub history: SnapshotHistory,

    pub limits: CaptureLimits,

    /// Currently focused pane
    pub focused_pane: FocusedPane,

    pub scroll: ScrollOffsets,

    /// Instructions executed since attaching
    pub steps: usize,

    /// Set once the tracee has exited or been killed
    pub finished: Option<WaitStatus>,

    /// Whether the app should quit
    pub should_quit: bool,

    /// Status message to display
    pub status_message: String,
}

impl App {
    /// Create the app and take the first snapshot of the stopped tracee
    pub fn new(session: Session, history: usize, limits: CaptureLimits) -> TraceResult<Self> {
        let mut history = SnapshotHistory::new(history);
        history.push(Snapshot::capture(session.tracee(), 0, None, limits)?);
        Ok(App {
            session,
            history,
            limits,
            focused_pane: FocusedPane::Registers,
            scroll: ScrollOffsets::default(),
            steps: 0,
            finished: None,
            should_quit: false,
            status_message: String::from("Attached"),
        })
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    /// Kill the tracee and release it
    pub fn shutdown(self) {
        self.session.shutdown();
    }

    /// Render the UI
    fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        // 4 panes in 2 columns, plus status bar at bottom
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(size);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(main_chunks[0]);

        // Left column: Registers (top) | Stack (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(columns[0]);

        // Right column: Backtrace (top) | Maps (bottom)
        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(columns[1]);

        let current = self.history.current();
        let previous = self.history.previous();

        super::panes::render_registers_pane(
            frame,
            left_rows[0],
            current,
            previous,
            self.focused_pane == FocusedPane::Registers,
            &mut self.scroll.registers,
        );

        super::panes::render_stack_pane(
            frame,
            left_rows[1],
            current,
            self.focused_pane == FocusedPane::Stack,
            &mut self.scroll.stack,
        );

        super::panes::render_backtrace_pane(
            frame,
            right_rows[0],
            current,
            self.focused_pane == FocusedPane::Backtrace,
            &mut self.scroll.backtrace,
        );

        super::panes::render_maps_pane(
            frame,
            right_rows[1],
            current,
            self.focused_pane == FocusedPane::Maps,
            &mut self.scroll.maps,
        );

        super::panes::render_status_bar(
            frame,
            main_chunks[1],
            super::panes::StatusRenderData {
                message: &self.status_message,
                pid: self.session.pid(),
                position: self.history.position(),
                total: self.history.len(),
                steps: current.map_or(self.steps, |s| s.step),
                is_live: self.history.is_at_latest(),
                finished: self.finished,
            },
        );
    }

    /// Handle keyboard events
    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            KeyCode::Char('s') => self.step_live(1),
            // Number keys step forward N times directly
            KeyCode::Char(c @ '1'..='9') => {
                let n = c.to_digit(10).unwrap_or(1) as usize;
                self.step_live(n);
            }
            KeyCode::Char('c') => self.continue_slice(),
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::BackTab => {
                self.focused_pane = self.focused_pane.prev();
            }
            KeyCode::Left => {
                if self.history.back() {
                    self.status_message = "Stepped back in history".to_string();
                } else {
                    self.status_message = "At the oldest snapshot".to_string();
                }
            }
            KeyCode::Right => {
                // Replay history first, then step the tracee
                if self.history.forward() {
                    self.status_message = "Stepped forward in history".to_string();
                } else {
                    self.step_live(1);
                }
            }
            KeyCode::Enter => {
                self.history.jump_to_latest();
                self.status_message = "Jumped to latest".to_string();
            }
            KeyCode::Up => {
                let offset = self.scroll.get_mut(self.focused_pane);
                *offset = offset.saturating_sub(1);
            }
            KeyCode::Down => {
                let offset = self.scroll.get_mut(self.focused_pane);
                *offset = offset.saturating_add(1);
            }
            _ => {}
        }
    }

    fn ensure_running(&mut self) -> bool {
        if let Some(status) = self.finished {
            self.status_message = format!("Tracee has finished: {:?}", status);
            return false;
        }
        self.history.jump_to_latest();
        true
    }

    /// Single-step the tracee `n` times and snapshot the result
    fn step_live(&mut self, n: usize) {
        if !self.ensure_running() {
            return;
        }
        let tracee = self.session.tracee();
        let run = run_steps(n, || tracee.single_step().and_then(|()| tracee.wait(true)));

        self.steps += run.stepped;
        if run.finished.is_some() {
            self.finished = run.finished;
        }
        self.status_message = format!("Stepped {} instruction(s)", run.stepped);
        if run.stepped > 0 {
            self.record(run.last);
        }
        if let Some(err) = run.error {
            self.status_message = format!(
                "Step failed after {} instruction(s): {}",
                run.stepped, err
            );
        }
    }

    /// Let the tracee run for a short slice, then stop it with `SIGSTOP`
    fn continue_slice(&mut self) {
        if !self.ensure_running() {
            return;
        }
        let tracee = self.session.tracee();
        let status = tracee.cont().and_then(|()| {
            thread::sleep(CONTINUE_SLICE);
            tracee.kill(libc::SIGSTOP)?;
            tracee.wait(true)
        });
        match status {
            Ok(status) if status.is_stopped() => {
                self.status_message =
                    format!("Ran for {} ms", CONTINUE_SLICE.as_millis());
                self.record(Some(status));
            }
            Ok(status) => self.finished = Some(status),
            Err(err) => self.status_message = format!("Continue failed: {}", err),
        }
    }

    fn record(&mut self, status: Option<WaitStatus>) {
        if self.finished.is_some() {
            self.status_message = "Tracee has finished".to_string();
            return;
        }
        match Snapshot::capture(self.session.tracee(), self.steps, status, self.limits) {
            Ok(snapshot) => self.history.push(snapshot),
            Err(err) => self.status_message = format!("Snapshot failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_cycles_through_all_panes() {
        let mut pane = FocusedPane::Registers;
        for _ in 0..4 {
            assert_eq!(pane.next().prev(), pane);
            pane = pane.next();
        }
        assert_eq!(pane, FocusedPane::Registers);
    }

    #[test]
    fn test_steps_before_a_failure_still_count() {
        let mut calls = 0;
        let run = run_steps(5, || {
            calls += 1;
            if calls == 3 {
                Err(TraceError::NoStack)
            } else {
                Ok(WaitStatus::Stopped(libc::SIGTRAP))
            }
        });
        assert_eq!(calls, 3);
        assert_eq!(run.stepped, 2);
        assert_eq!(run.last, Some(WaitStatus::Stopped(libc::SIGTRAP)));
        assert!(run.finished.is_none());
        assert!(matches!(run.error, Some(TraceError::NoStack)));
    }

    #[test]
    fn test_exit_ends_the_run() {
        let mut statuses = vec![WaitStatus::Exited(0), WaitStatus::Stopped(libc::SIGTRAP)];
        let run = run_steps(9, || Ok(statuses.pop().unwrap_or(WaitStatus::Exited(1))));
        assert_eq!(run.stepped, 1);
        assert_eq!(run.finished, Some(WaitStatus::Exited(0)));
        assert!(run.error.is_none());
    }

    #[test]
    fn test_scroll_offsets_are_per_pane() {
        let mut scroll = ScrollOffsets::default();
        *scroll.get_mut(FocusedPane::Maps) += 3;
        assert_eq!(scroll.maps, 3);
        assert_eq!(scroll.stack, 0);
    }
}
