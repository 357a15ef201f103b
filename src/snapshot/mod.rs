// Captured tracee state for the watch view

use crate::trace::{Backtrace, MemoryMapping, Registers, TraceResult, Tracee, WaitStatus};

/// How much of the tracee a snapshot records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub stack_words: usize,
    pub max_args: usize,
    pub max_depth: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        CaptureLimits {
            stack_words: 32,
            max_args: 6,
            max_depth: 25,
        }
    }
}

/// State of a stopped tracee at one point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub step: usize,
    pub status: Option<WaitStatus>,
    pub regs: Registers,
    pub backtrace: Backtrace,
    /// `(address, word)` pairs from the stack pointer upwards
    pub stack: Vec<(u64, u64)>,
    pub mappings: Vec<MemoryMapping>,
}

impl Snapshot {
    /// Read everything a snapshot holds from a stopped tracee
    pub fn capture(
        tracee: &Tracee,
        step: usize,
        status: Option<WaitStatus>,
        limits: CaptureLimits,
    ) -> TraceResult<Self> {
        let regs = tracee.regs()?;
        let backtrace = tracee.backtrace(limits.max_args, limits.max_depth)?;
        let stack = tracee.dump_stack(limits.stack_words).unwrap_or_else(|err| {
            log::debug!("stack dump failed: {}", err);
            Vec::new()
        });
        let mappings = tracee.mappings()?;
        Ok(Snapshot {
            step,
            status,
            regs,
            backtrace,
            stack,
            mappings,
        })
    }

    /// The mapping the instruction pointer lies in, if any
    pub fn code_mapping(&self) -> Option<&MemoryMapping> {
        self.mappings.iter().find(|m| m.contains(self.regs.rip))
    }
}

/// Bounded history of snapshots with a movable cursor
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    snapshots: Vec<Snapshot>,
    position: usize,
    limit: usize,
}

impl SnapshotHistory {
    /// `limit` is clamped to at least one snapshot
    pub fn new(limit: usize) -> Self {
        SnapshotHistory {
            snapshots: Vec::new(),
            position: 0,
            limit: limit.max(1),
        }
    }

    /// Append a snapshot and move the cursor onto it, dropping the oldest
    /// when full
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.snapshots.len() == self.limit {
            self.snapshots.remove(0);
        }
        self.snapshots.push(snapshot);
        self.position = self.snapshots.len() - 1;
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.snapshots.get(self.position)
    }

    /// The snapshot just before the cursor
    pub fn previous(&self) -> Option<&Snapshot> {
        self.position
            .checked_sub(1)
            .and_then(|i| self.snapshots.get(i))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_at_latest(&self) -> bool {
        self.snapshots.is_empty() || self.position + 1 == self.snapshots.len()
    }

    /// Move the cursor back; false at the oldest snapshot
    pub fn back(&mut self) -> bool {
        if self.position == 0 {
            return false;
        }
        self.position -= 1;
        true
    }

    /// Move the cursor forward; false at the newest snapshot
    pub fn forward(&mut self) -> bool {
        if self.is_at_latest() {
            return false;
        }
        self.position += 1;
        true
    }

    pub fn jump_to_latest(&mut self) {
        self.position = self.snapshots.len().saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(step: usize) -> Snapshot {
        Snapshot {
            step,
            status: None,
            regs: Registers {
                rip: 0x1000 + step as u64,
                ..Registers::default()
            },
            backtrace: Backtrace::default(),
            stack: Vec::new(),
            mappings: Vec::new(),
        }
    }

    #[test]
    fn test_push_moves_cursor_to_newest() {
        let mut history = SnapshotHistory::new(8);
        assert!(history.current().is_none());
        history.push(snapshot(0));
        history.push(snapshot(1));
        assert_eq!(history.current().unwrap().step, 1);
        assert!(history.is_at_latest());
    }

    #[test]
    fn test_navigation() {
        let mut history = SnapshotHistory::new(8);
        for step in 0..3 {
            history.push(snapshot(step));
        }
        assert!(history.back());
        assert!(history.back());
        assert!(!history.back());
        assert_eq!(history.current().unwrap().step, 0);
        assert!(history.previous().is_none());
        assert!(history.forward());
        assert_eq!(history.previous().unwrap().step, 0);
        assert!(!history.is_at_latest());
        history.jump_to_latest();
        assert!(!history.forward());
        assert_eq!(history.current().unwrap().step, 2);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut history = SnapshotHistory::new(2);
        for step in 0..5 {
            history.push(snapshot(step));
        }
        assert_eq!(history.len(), 2);
        history.back();
        assert_eq!(history.current().unwrap().step, 3);
    }

    #[test]
    fn test_code_mapping_lookup() {
        let mut snap = snapshot(0);
        snap.mappings = crate::trace::maps::parse_mappings(
            "0000-0800 r--p 00000000 00:00 0 /a\n0800-2000 r-xp 00000000 00:00 0 /b\n",
        )
        .unwrap();
        assert_eq!(snap.code_mapping().unwrap().pathname, "/b");
    }
}
