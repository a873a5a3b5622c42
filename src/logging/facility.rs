// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging facilities (component identifiers)

use serde::{Deserialize, Serialize};

/// Logging facility - identifies which component generated the log message
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facility {
    // === Protocol core ===
    /// Engine lifecycle, packet dispatch
    Engine = 0,
    /// HELLO emission and processing
    Hello = 1,
    /// Neighbor/association tuple lifecycle
    Repository = 2,
    /// Forwarder election and multicast liveness
    Arbitration = 3,
    /// Forwarding table computation and lookup
    Forwarding = 4,

    // === Host glue ===
    /// Socket operations, interface queries
    Transport = 5,
    /// Timer queue
    Timer = 6,
    /// Configuration loading and validation
    Config = 7,

    /// Test harness and fixtures
    Test = 12,

    /// Fallback for uncategorized messages
    Unknown = 255,
}

impl Facility {
    /// Get facility code as u8
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get facility name as static string
    pub const fn as_str(self) -> &'static str {
        match self {
            Facility::Engine => "Engine",
            Facility::Hello => "Hello",
            Facility::Repository => "Repository",
            Facility::Arbitration => "Arbitration",
            Facility::Forwarding => "Forwarding",
            Facility::Transport => "Transport",
            Facility::Timer => "Timer",
            Facility::Config => "Config",
            Facility::Test => "Test",
            Facility::Unknown => "Unknown",
        }
    }

    /// Create from u8 value (returns Unknown if invalid)
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Facility::Engine,
            1 => Facility::Hello,
            2 => Facility::Repository,
            3 => Facility::Arbitration,
            4 => Facility::Forwarding,
            5 => Facility::Transport,
            6 => Facility::Timer,
            7 => Facility::Config,
            12 => Facility::Test,
            _ => Facility::Unknown,
        }
    }

    /// Parse a facility from its (case-insensitive) name
    pub fn from_name(name: &str) -> Option<Self> {
        let facility = match name.to_ascii_lowercase().as_str() {
            "engine" => Facility::Engine,
            "hello" => Facility::Hello,
            "repository" => Facility::Repository,
            "arbitration" => Facility::Arbitration,
            "forwarding" => Facility::Forwarding,
            "transport" => Facility::Transport,
            "timer" => Facility::Timer,
            "config" => Facility::Config,
            "test" => Facility::Test,
            _ => return None,
        };
        Some(facility)
    }

    /// Facilities that fire on every received packet or timer
    pub const fn is_high_frequency(self) -> bool {
        matches!(self, Facility::Hello | Facility::Repository | Facility::Timer)
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
