use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Number of lines kept when no other capacity is requested.
pub const DEFAULT_CAPACITY: usize = 50;

/// Separates entries in the history file. Picked so it never shows up in
/// typed input.
pub const ENTRY_DELIMITER: &str = "\u{1}\u{2}";

/// Bounded, in-memory command history.
///
/// Appending past capacity evicts the oldest entries. A navigation cursor
/// supports stepping backwards and forwards through the stored lines; it is
/// moved back past the newest entry on every append.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// Record a line, dropping everything from the first newline on.
    pub fn append(&mut self, line: &str) {
        let line = line.split('\n').next().unwrap_or_default();
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
        self.cursor = self.entries.len();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Write `N: line` for every entry, numbering from 1.
    pub fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        for (i, line) in self.entries.iter().enumerate() {
            writeln!(out, "{}: {}", i + 1, line)?;
        }
        Ok(())
    }

    /// Step back to the previous entry, if any.
    pub fn previous(&mut self) -> Option<&str> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Step forward to the next entry. Past the newest entry the cursor rests
    /// at the end and `None` is returned.
    pub fn next(&mut self) -> Option<&str> {
        if self.cursor + 1 >= self.entries.len() {
            self.cursor = self.entries.len();
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Write every entry, each followed by [`ENTRY_DELIMITER`], to `path`.
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        let mut data = String::new();
        for line in &self.entries {
            data.push_str(line);
            data.push_str(ENTRY_DELIMITER);
        }
        fs::write(path, data)
    }

    /// Append the entries stored at `path`. A missing file is not an error.
    pub fn restore(&mut self, path: &Path) -> io::Result<()> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for line in data.split(ENTRY_DELIMITER).filter(|l| !l.is_empty()) {
            self.append(line);
        }
        Ok(())
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
