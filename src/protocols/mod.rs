// SPDX-License-Identifier: Apache-2.0 OR MIT
//! AIMF protocol state machines
//!
//! This module contains the pieces of the protocol that are pure functions
//! over state: they never touch a socket or a clock. The engine feeds them
//! the current time and turns the [`TimerRequest`]s they return into
//! scheduler calls.
//!
//! - **wire**: packet/message codec and the 8-bit time code
//! - **repository**: soft-state tables (neighbors, associations, group timers)
//! - **hello**: HELLO construction, processing, tuple expiry
//! - **arbitration**: forwarder election and group liveness
//!
//! ## Key Addresses
//!
//! | Address | Purpose |
//! |---------|---------|
//! | 230.0.0.30 | HELLO destination group |
//! | UDP 1337 | AIMF control port |

pub mod arbitration;
pub mod hello;
pub mod repository;
pub mod wire;

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::Timestamp;

/// Well-known UDP port for AIMF control traffic
pub const AIMF_PORT: u16 = 1337;

/// Multicast group HELLO packets are sent to
pub const AIMF_HELLO_GROUP: Ipv4Addr = Ipv4Addr::new(230, 0, 0, 30);

/// TTL placed in every originated message header
pub const AIMF_MAX_TTL: u8 = 255;

// Default timer values
pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_ARBITRATION_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_INITIAL_ARBITRATION_DELAY: Duration = Duration::from_secs(10);
/// Neighbor hold time = 3 x hello interval
pub const DEFAULT_NEIGHBOR_HOLD_MULTIPLIER: u32 = 3;
/// Liveness base window = 4 x hello interval
pub const DEFAULT_ACTIVITY_WINDOW_MULTIPLIER: u32 = 4;

/// Types of timers used by the protocol
///
/// Hello and arbitration timers carry the start epoch they were armed in;
/// a token from an earlier epoch fires as a no-op after `Stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerType {
    /// Periodic HELLO emission
    Hello { epoch: u64 },
    /// Periodic willingness arbitration
    Arbitration { epoch: u64 },
    /// Neighbor tuple expiry check
    NeighborExpiry { neighbor: Ipv4Addr },
    /// Association tuple expiry check
    AssociationExpiry {
        advertiser: Ipv4Addr,
        group: Ipv4Addr,
        source: Ipv4Addr,
    },
    /// Group liveness window re-check
    GroupActivity { group: Ipv4Addr },
}

impl TimerType {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            TimerType::Hello { .. } => "hello",
            TimerType::Arbitration { .. } => "arbitration",
            TimerType::NeighborExpiry { .. } => "neighbor-expiry",
            TimerType::AssociationExpiry { .. } => "association-expiry",
            TimerType::GroupActivity { .. } => "group-activity",
        }
    }
}

/// Request to schedule a timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRequest {
    /// Type of timer
    pub timer_type: TimerType,
    /// When the timer should fire
    pub fire_at: Timestamp,
}

impl TimerRequest {
    pub fn new(timer_type: TimerType, fire_at: Timestamp) -> Self {
        Self {
            timer_type,
            fire_at,
        }
    }
}
