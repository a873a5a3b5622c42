// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logger handle with severity filtering

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use super::entry::LogEntry;
use super::sink::{LogSink, NullSink, StderrJsonSink};
use super::{Facility, Severity};

/// Logger handle for writing log entries
///
/// This is a lightweight handle that can be cloned and passed around.
/// The sink and the level filters are shared via Arc, so changing the level
/// through one clone affects all of them.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    /// Global minimum log level (default: Info)
    global_min_level: Arc<AtomicU8>,
    /// Per-facility minimum log levels
    facility_min_levels: Arc<RwLock<HashMap<Facility, Severity>>>,
    /// Identity of the node this handle logs for
    context: Option<Arc<str>>,
}

impl Logger {
    /// Create a logger writing to `sink` at Info level
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            global_min_level: Arc::new(AtomicU8::new(Severity::Info as u8)),
            facility_min_levels: Arc::new(RwLock::new(HashMap::new())),
            context: None,
        }
    }

    /// Create a logger that writes JSON directly to stderr
    pub fn stderr_json() -> Self {
        Self::new(Arc::new(StderrJsonSink))
    }

    /// Create a logger that drops everything
    pub fn null() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Clone of this handle that tags every entry with `context`
    ///
    /// Filters stay shared with the parent handle.
    pub fn with_context(&self, context: impl Into<String>) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            global_min_level: Arc::clone(&self.global_min_level),
            facility_min_levels: Arc::clone(&self.facility_min_levels),
            context: Some(Arc::from(context.into())),
        }
    }

    /// Check if a log message should be written based on severity filtering
    #[inline]
    pub fn enabled(&self, severity: Severity, facility: Facility) -> bool {
        // Facility-specific level overrides the global one
        let facility_level = match self.facility_min_levels.read() {
            Ok(levels) => levels.get(&facility).copied(),
            Err(poisoned) => poisoned.into_inner().get(&facility).copied(),
        };
        if let Some(min_level) = facility_level {
            return severity <= min_level;
        }

        let global_min = self.global_min_level.load(Ordering::Relaxed);
        (severity as u8) <= global_min
    }

    fn entry(&self, severity: Severity, facility: Facility, message: &str) -> LogEntry {
        let mut entry = LogEntry::new(severity, facility, message);
        entry.context = self.context.as_deref().map(str::to_string);
        entry
    }

    /// Write a log entry
    #[inline]
    pub fn log(&self, severity: Severity, facility: Facility, message: &str) {
        if !self.enabled(severity, facility) {
            return;
        }
        self.sink.write(self.entry(severity, facility, message));
    }

    /// Write a log entry with key-value pairs
    #[inline]
    pub fn log_kv(
        &self,
        severity: Severity,
        facility: Facility,
        message: &str,
        kvs: &[(&str, &str)],
    ) {
        if !self.enabled(severity, facility) {
            return;
        }

        let mut entry = self.entry(severity, facility, message);
        for (key, value) in kvs {
            entry.add_kv(key, value);
        }
        self.sink.write(entry);
    }

    /// Log with critical severity
    #[inline]
    pub fn critical(&self, facility: Facility, message: &str) {
        self.log(Severity::Critical, facility, message);
    }

    /// Log with error severity
    #[inline]
    pub fn error(&self, facility: Facility, message: &str) {
        self.log(Severity::Error, facility, message);
    }

    /// Log with warning severity
    #[inline]
    pub fn warning(&self, facility: Facility, message: &str) {
        self.log(Severity::Warning, facility, message);
    }

    /// Log with notice severity
    #[inline]
    pub fn notice(&self, facility: Facility, message: &str) {
        self.log(Severity::Notice, facility, message);
    }

    /// Log with info severity
    #[inline]
    pub fn info(&self, facility: Facility, message: &str) {
        self.log(Severity::Info, facility, message);
    }

    /// Log with debug severity
    #[inline]
    pub fn debug(&self, facility: Facility, message: &str) {
        self.log(Severity::Debug, facility, message);
    }

    /// Set the global minimum log level
    pub fn set_global_level(&self, level: Severity) {
        self.global_min_level.store(level as u8, Ordering::Relaxed);
    }

    /// Set the minimum log level for a specific facility
    pub fn set_facility_level(&self, facility: Facility, level: Severity) {
        match self.facility_min_levels.write() {
            Ok(mut levels) => {
                levels.insert(facility, level);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(facility, level);
            }
        }
    }

    /// Clear the facility-specific log level (fall back to global)
    pub fn clear_facility_level(&self, facility: Facility) {
        match self.facility_min_levels.write() {
            Ok(mut levels) => {
                levels.remove(&facility);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&facility);
            }
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("context", &self.context)
            .field(
                "global_min_level",
                &Severity::from_u8(self.global_min_level.load(Ordering::Relaxed)),
            )
            .finish()
    }
}
