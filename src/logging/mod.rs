// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Facility-tagged logging for the protocol engine and daemon.
//!
//! Every component logs through a cloneable [`Logger`] handle. Entries carry a
//! [`Facility`] (which component), a syslog-style [`Severity`], and the
//! identity of the node that produced them, and are handed to a [`LogSink`].

mod entry;
mod facility;
mod logger;
#[macro_use]
mod macros;
mod severity;
mod sink;

pub use entry::LogEntry;
pub use facility::Facility;
pub use logger::Logger;
pub use severity::Severity;
pub use sink::{LogSink, MemorySink, NullSink, StderrJsonSink};
