// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Engine counters

use serde::Serialize;

/// Cumulative counters for one protocol instance
///
/// Counters survive `Stop()`/`Start()` cycles; they describe the instance,
/// not the current protocol state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub send_errors: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// TTL 0 or originated by this node
    pub messages_dropped: u64,
    pub unknown_messages: u64,
    pub malformed_packets: u64,
    pub neighbors_created: u64,
    pub neighbors_expired: u64,
    pub associations_created: u64,
    pub associations_expired: u64,
    pub arbitration_runs: u64,
    pub table_rebuilds: u64,
    pub multicast_forwarded: u64,
    pub multicast_suppressed: u64,
}
