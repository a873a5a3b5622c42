// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Collaborator interfaces the engine is constructed with
//!
//! The engine never discovers its clock, sockets or unicast table at
//! runtime; the caller hands it one implementation of each trait. The
//! deterministic implementations live in [`crate::sim`], the tokio/UDP ones
//! in [`crate::runtime`].

use std::net::{Ipv4Addr, SocketAddrV4};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocols::TimerType;
use crate::{NetworkInterface, Timestamp};

/// Errors raised by a transport implementation
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind port {port} on interface {interface}: {source}")]
    Bind {
        interface: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Interface index {0} is not bound")]
    NotBound(u32),

    #[error("Failed to send on interface index {interface}: {source}")]
    Send {
        interface: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Clock and timer queue
///
/// Timers fire in non-decreasing time order, ties in registration order.
/// There is no cancel: a fired timer that is no longer wanted is ignored by
/// the engine.
pub trait Scheduler {
    fn now(&self) -> Timestamp;

    fn schedule_at(&mut self, at: Timestamp, timer: TimerType);
}

/// Per-interface datagram transport on a fixed port
pub trait Transport {
    /// Open the endpoint for `interface`
    fn bind(&mut self, interface: &NetworkInterface, port: u16) -> Result<(), TransportError>;

    /// Close the endpoint for an interface index; unknown indices are ignored
    fn unbind(&mut self, interface: u32);

    fn send(
        &mut self,
        interface: u32,
        payload: &[u8],
        destination: SocketAddrV4,
    ) -> Result<(), TransportError>;
}

/// A resolved unicast route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnicastRoute {
    pub destination: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub interface: u32,
}

/// Read-only view of the host unicast routing table
pub trait RouteLookup {
    fn lookup_route(&self, destination: Ipv4Addr) -> Option<UnicastRoute>;
}
