// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Observer hooks and diagnostics fan-out
//!
//! Hooks receive owned snapshots built at the moment of the event, so an
//! observer never sees a value the engine is still mutating. Observers have
//! no effect on protocol behavior.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use serde::Serialize;

use crate::mroute::ForwardingEntry;
use crate::protocols::arbitration::ArbitrationOutcome;
use crate::protocols::wire::Packet;

/// A control packet as sent or received on one interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketSnapshot {
    pub node_id: u32,
    pub interface: u32,
    /// Destination when sent, sender when received
    pub peer: Ipv4Addr,
    pub size: usize,
    pub packet: Packet,
}

/// A multicast data packet that hit the forwarding table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MulticastSnapshot {
    pub node_id: u32,
    pub origin: Ipv4Addr,
    pub group: Ipv4Addr,
    /// Arrival interface, if the caller knew it
    pub interface: Option<u32>,
    pub entry: ForwardingEntry,
}

/// Callbacks fired by the engine; every method defaults to a no-op
pub trait EngineObserver {
    fn packet_sent(&mut self, _snapshot: &PacketSnapshot) {}

    fn packet_received(&mut self, _snapshot: &PacketSnapshot) {}

    fn multicast_received(&mut self, _snapshot: &MulticastSnapshot) {}

    fn multicast_forwarded(&mut self, _snapshot: &MulticastSnapshot) {}

    fn table_size_changed(&mut self, _node_id: u32, _size: usize) {}

    fn forwarding_changed(&mut self, _node_id: u32, _outcome: &ArbitrationOutcome) {}
}

/// Lets a caller keep a handle on an observer it gave to an engine
impl<O: EngineObserver + ?Sized> EngineObserver for Rc<RefCell<O>> {
    fn packet_sent(&mut self, snapshot: &PacketSnapshot) {
        self.borrow_mut().packet_sent(snapshot);
    }

    fn packet_received(&mut self, snapshot: &PacketSnapshot) {
        self.borrow_mut().packet_received(snapshot);
    }

    fn multicast_received(&mut self, snapshot: &MulticastSnapshot) {
        self.borrow_mut().multicast_received(snapshot);
    }

    fn multicast_forwarded(&mut self, snapshot: &MulticastSnapshot) {
        self.borrow_mut().multicast_forwarded(snapshot);
    }

    fn table_size_changed(&mut self, node_id: u32, size: usize) {
        self.borrow_mut().table_size_changed(node_id, size);
    }

    fn forwarding_changed(&mut self, node_id: u32, outcome: &ArbitrationOutcome) {
        self.borrow_mut().forwarding_changed(node_id, outcome);
    }
}

/// Serializable form of every observer hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineNotification {
    PacketSent(PacketSnapshot),
    PacketReceived(PacketSnapshot),
    MulticastReceived(MulticastSnapshot),
    MulticastForwarded(MulticastSnapshot),
    TableSizeChanged {
        node_id: u32,
        size: usize,
    },
    ForwardingChanged {
        node_id: u32,
        outcome: ArbitrationOutcome,
    },
}

/// Collects notifications in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub notifications: Vec<EngineNotification>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&EngineNotification) -> bool) -> usize {
        self.notifications.iter().filter(|n| pred(n)).count()
    }
}

impl EngineObserver for RecordingObserver {
    fn packet_sent(&mut self, snapshot: &PacketSnapshot) {
        self.notifications
            .push(EngineNotification::PacketSent(snapshot.clone()));
    }

    fn packet_received(&mut self, snapshot: &PacketSnapshot) {
        self.notifications
            .push(EngineNotification::PacketReceived(snapshot.clone()));
    }

    fn multicast_received(&mut self, snapshot: &MulticastSnapshot) {
        self.notifications
            .push(EngineNotification::MulticastReceived(snapshot.clone()));
    }

    fn multicast_forwarded(&mut self, snapshot: &MulticastSnapshot) {
        self.notifications
            .push(EngineNotification::MulticastForwarded(snapshot.clone()));
    }

    fn table_size_changed(&mut self, node_id: u32, size: usize) {
        self.notifications
            .push(EngineNotification::TableSizeChanged { node_id, size });
    }

    fn forwarding_changed(&mut self, node_id: u32, outcome: &ArbitrationOutcome) {
        self.notifications.push(EngineNotification::ForwardingChanged {
            node_id,
            outcome: *outcome,
        });
    }
}

/// Fans engine notifications out to diagnostics subscribers
///
/// Backed by a tokio broadcast channel; slow subscribers lag and lose
/// notifications rather than blocking the engine.
#[derive(Clone)]
pub struct EventSubscriptionManager {
    event_tx: tokio::sync::broadcast::Sender<EngineNotification>,
}

impl EventSubscriptionManager {
    /// Create a new EventSubscriptionManager with the specified buffer size
    pub fn new(buffer_size: usize) -> Self {
        let (event_tx, _) = tokio::sync::broadcast::channel(buffer_size);
        Self { event_tx }
    }

    /// Get a new receiver for subscribing to events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineNotification> {
        self.event_tx.subscribe()
    }

    /// Send an event to all subscribers
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no subscribers, returns 0 (not an error).
    pub fn send(&self, event: EngineNotification) -> usize {
        self.event_tx.send(event).unwrap_or_default()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for EventSubscriptionManager {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EngineObserver for EventSubscriptionManager {
    fn packet_sent(&mut self, snapshot: &PacketSnapshot) {
        self.send(EngineNotification::PacketSent(snapshot.clone()));
    }

    fn packet_received(&mut self, snapshot: &PacketSnapshot) {
        self.send(EngineNotification::PacketReceived(snapshot.clone()));
    }

    fn multicast_received(&mut self, snapshot: &MulticastSnapshot) {
        self.send(EngineNotification::MulticastReceived(snapshot.clone()));
    }

    fn multicast_forwarded(&mut self, snapshot: &MulticastSnapshot) {
        self.send(EngineNotification::MulticastForwarded(snapshot.clone()));
    }

    fn table_size_changed(&mut self, node_id: u32, size: usize) {
        self.send(EngineNotification::TableSizeChanged { node_id, size });
    }

    fn forwarding_changed(&mut self, node_id: u32, outcome: &ArbitrationOutcome) {
        self.send(EngineNotification::ForwardingChanged {
            node_id,
            outcome: *outcome,
        });
    }
}
