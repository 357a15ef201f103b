//! `/proc/<pid>/maps` parsing

use super::error::{TraceError, TraceResult};
use regex::Regex;
use std::fmt;
use std::fs;
use std::sync::LazyLock;

/// `start-end perms offset major:minor inode [pathname]`
static MAPS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([0-9a-f]+)-([0-9a-f]+) (.{4}) ([0-9a-f]+) ([0-9a-f]{2,}):([0-9a-f]{2,}) ([0-9]+)(?: +(.*))?$",
    )
    .expect("maps line pattern is valid")
});

/// One line of a process's memory map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapping {
    pub start: u64,
    pub end: u64,
    pub permissions: String,
    pub offset: u64,
    pub major: u64,
    pub minor: u64,
    pub inode: u64,
    /// Empty for anonymous mappings
    pub pathname: String,
}

impl MemoryMapping {
    pub fn parse(line: &str) -> TraceResult<Self> {
        let caps = MAPS_LINE
            .captures(line)
            .ok_or_else(|| TraceError::MapsParse(line.to_string()))?;

        let hex = |i: usize| {
            u64::from_str_radix(&caps[i], 16).map_err(|_| TraceError::MapsParse(line.to_string()))
        };

        Ok(MemoryMapping {
            start: hex(1)?,
            end: hex(2)?,
            permissions: caps[3].to_string(),
            offset: hex(4)?,
            major: hex(5)?,
            minor: hex(6)?,
            inode: caps[7]
                .parse()
                .map_err(|_| TraceError::MapsParse(line.to_string()))?,
            pathname: caps
                .get(8)
                .map(|m| m.as_str().trim_end().to_string())
                .unwrap_or_default(),
        })
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: u64) -> bool {
        self.start <= address && address < self.end
    }

    pub fn is_readable(&self) -> bool {
        self.permissions.starts_with('r')
    }

    pub fn is_stack(&self) -> bool {
        self.pathname == "[stack]"
    }
}

impl fmt::Display for MemoryMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:016X}-0x{:016X} {} {}",
            self.start, self.end, self.permissions, self.pathname
        )
    }
}

/// Parse the full text of a maps file, skipping blank lines
pub fn parse_mappings(text: &str) -> TraceResult<Vec<MemoryMapping>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(MemoryMapping::parse)
        .collect()
}

/// Read and parse `/proc/<pid>/maps`
pub fn read_process_mappings(pid: i32) -> TraceResult<Vec<MemoryMapping>> {
    let path = format!("/proc/{}/maps", pid);
    let text =
        fs::read_to_string(&path).map_err(|source| TraceError::MapsUnavailable { pid, source })?;
    parse_mappings(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
55d0c8a00000-55d0c8a05000 r--p 00000000 fd:01 1835023                    /usr/bin/callchain
55d0c8a05000-55d0c8a3b000 r-xp 00005000 fd:01 1835023                    /usr/bin/callchain
55d0ca1f4000-55d0ca215000 rw-p 00000000 00:00 0                          [heap]
7f3a1c000000-7f3a1c021000 rw-p 00000000 00:00 0
7ffd6f4d1000-7ffd6f4f2000 rw-p 00000000 00:00 0                          [stack]
";

    #[test]
    fn test_parse_file_backed_mapping() {
        let mapping = MemoryMapping::parse(SAMPLE.lines().nth(1).unwrap()).unwrap();
        assert_eq!(mapping.start, 0x55d0c8a05000);
        assert_eq!(mapping.end, 0x55d0c8a3b000);
        assert_eq!(mapping.permissions, "r-xp");
        assert_eq!(mapping.offset, 0x5000);
        assert_eq!(mapping.major, 0xfd);
        assert_eq!(mapping.minor, 0x01);
        assert_eq!(mapping.inode, 1835023);
        assert_eq!(mapping.pathname, "/usr/bin/callchain");
    }

    #[test]
    fn test_parse_anonymous_mapping() {
        let mapping = MemoryMapping::parse(SAMPLE.lines().nth(3).unwrap()).unwrap();
        assert_eq!(mapping.pathname, "");
        assert_eq!(mapping.len(), 0x21000);
    }

    #[test]
    fn test_parse_whole_file() {
        let maps = parse_mappings(SAMPLE).unwrap();
        assert_eq!(maps.len(), 5);
        assert_eq!(maps.iter().filter(|m| m.is_stack()).count(), 1);
        assert_eq!(maps[2].pathname, "[heap]");
        assert!(maps[2].contains(0x55d0ca1f4000));
        assert!(!maps[2].contains(0x55d0ca215000));
    }

    #[test]
    fn test_path_with_spaces() {
        let line = "7f0000000000-7f0000001000 r--p 00000000 103:02 42     /tmp/my lib.so";
        let mapping = MemoryMapping::parse(line).unwrap();
        assert_eq!(mapping.pathname, "/tmp/my lib.so");
        assert_eq!(mapping.major, 0x103);
    }

    #[test]
    fn test_garbage_line_is_rejected() {
        let err = MemoryMapping::parse("not a mapping").unwrap_err();
        assert!(matches!(err, TraceError::MapsParse(ref line) if line == "not a mapping"));
    }

    #[test]
    fn test_display() {
        let mapping = MemoryMapping::parse(SAMPLE.lines().nth(4).unwrap()).unwrap();
        assert_eq!(
            mapping.to_string(),
            "0x00007FFD6F4D1000-0x00007FFD6F4F2000 rw-p [stack]"
        );
    }

    #[test]
    fn test_own_process_has_a_stack() {
        let maps = read_process_mappings(std::process::id() as i32).unwrap();
        assert!(maps.iter().any(|m| m.is_stack()));
    }
}
