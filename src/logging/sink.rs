// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log sinks - where entries end up

use std::sync::Mutex;

use super::entry::LogEntry;
use super::{Facility, Severity};

/// Output sink for log entries
pub trait LogSink: Send + Sync {
    /// Write a log entry to the sink
    fn write(&self, entry: LogEntry);
}

/// Writes one JSON object per line to stderr
pub struct StderrJsonSink;

impl LogSink for StderrJsonSink {
    fn write(&self, entry: LogEntry) {
        eprintln!("{}", entry.to_json());
        // No flush() - let stderr buffer naturally
    }
}

/// Discards everything
pub struct NullSink;

impl LogSink for NullSink {
    fn write(&self, _entry: LogEntry) {}
}

/// Keeps entries in memory so tests can assert on what was logged
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Entries for one facility at or above (more severe than) `severity`
    pub fn matching(&self, facility: Facility, severity: Severity) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.facility == facility && e.severity <= severity)
            .collect()
    }

    /// True if any entry's message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write(&self, entry: LogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
