// SPDX-License-Identifier: Apache-2.0 OR MIT
//! AIMF protocol engine
//!
//! The engine owns one protocol instance's state (repository, forwarding
//! table, willingness, forward flag, sequence counters) and is the only
//! component that talks to the collaborators it was constructed with.
//!
//! ## Execution model
//!
//! Everything runs as callbacks driven by the caller: [`ProtocolEngine::handle_timer`]
//! when a scheduled timer fires, [`ProtocolEngine::receive`] when a datagram
//! arrives, and the operator API. No call blocks and no two calls overlap.
//!
//! ## Timers
//!
//! | Timer | Armed by | On fire |
//! |-------|----------|---------|
//! | Hello | Start, itself | send HELLO, re-arm after hello interval |
//! | Arbitration | Start, itself | arbitrate, re-arm after interval + (7 - w) s |
//! | NeighborExpiry | tuple creation | erase if expired, else re-arm |
//! | AssociationExpiry | tuple creation | erase if expired, else re-arm |
//! | GroupActivity | first sighting | update liveness state |
//!
//! Hello and arbitration tokens carry the start epoch; `Stop()` bumps it so
//! tokens still queued from the previous run are ignored.

mod collaborators;
mod observer;
mod stats;

pub use collaborators::{RouteLookup, Scheduler, Transport, TransportError, UnicastRoute};
pub use observer::{
    EngineNotification, EngineObserver, EventSubscriptionManager, MulticastSnapshot,
    PacketSnapshot, RecordingObserver,
};
pub use stats::EngineStats;

use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;

use crate::config::{ConfigError, ProtocolConfig};
use crate::logging::{Facility, Logger, Severity};
use crate::mroute::{ForwardingEntry, ForwardingTable, InterfaceSelector};
use crate::protocols::arbitration::{self, Activity, ArbitrationOutcome};
use crate::protocols::hello::{self, ExpiryOutcome};
use crate::protocols::repository::{Association, NeighborTuple, Repository};
use crate::protocols::wire::{MessageBody, Packet};
use crate::protocols::{TimerRequest, TimerType, AIMF_HELLO_GROUP, AIMF_PORT};
use crate::validation::{validate_association_source, validate_multicast_group};
use crate::{NodeContext, Timestamp, Willingness};

/// Errors surfaced by the engine API
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no interface can run the protocol (all loopback or excluded)")]
    NoParticipatingInterface,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What to do with a multicast data packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MulticastDecision {
    /// Forward out of the entry's output interfaces
    Forward(ForwardingEntry),
    /// Matched, but this node is not the active forwarder
    Suppressed(ForwardingEntry),
    NoRoute,
}

/// One AIMF protocol instance
pub struct ProtocolEngine<S: Scheduler, T: Transport, R: RouteLookup> {
    ctx: NodeContext,
    config: ProtocolConfig,
    scheduler: S,
    transport: T,
    routes: R,
    logger: Logger,
    repo: Repository,
    table: ForwardingTable,
    willingness: Willingness,
    forward: bool,
    suspended: bool,
    running: bool,
    epoch: u64,
    packet_sequence: u16,
    message_sequence: u16,
    bound: Vec<u32>,
    observers: Vec<Box<dyn EngineObserver>>,
    stats: EngineStats,
    last_arbitration: Option<ArbitrationOutcome>,
}

impl<S: Scheduler, T: Transport, R: RouteLookup> ProtocolEngine<S, T, R> {
    /// Create a stopped engine; `config` is validated here
    pub fn new(
        ctx: NodeContext,
        config: ProtocolConfig,
        scheduler: S,
        transport: T,
        routes: R,
        logger: Logger,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let logger = logger.with_context(ctx.log_label());
        Ok(Self {
            willingness: config.willingness,
            ctx,
            config,
            scheduler,
            transport,
            routes,
            logger,
            repo: Repository::new(),
            table: ForwardingTable::new(),
            forward: false,
            suspended: false,
            running: false,
            epoch: 0,
            // pre-incremented, so the first value sent is 0
            packet_sequence: u16::MAX,
            message_sequence: u16::MAX,
            bound: Vec::new(),
            observers: Vec::new(),
            stats: EngineStats::default(),
            last_arbitration: None,
        })
    }

    // ---------------- lifecycle -------------------------------

    /// Bind every participating interface and arm the periodic timers
    ///
    /// A bind failure unwinds the interfaces already bound and is returned;
    /// it indicates misconfiguration and is not retried.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running {
            log_debug!(self.logger, Facility::Engine, "Start() on running engine ignored");
            return Ok(());
        }

        let interfaces: Vec<_> = self.ctx.participating_interfaces().cloned().collect();
        if interfaces.is_empty() {
            log_error!(
                self.logger,
                Facility::Engine,
                "No participating interface; protocol not started"
            );
            return Err(EngineError::NoParticipatingInterface);
        }

        for iface in &interfaces {
            if let Err(e) = self.transport.bind(iface, AIMF_PORT) {
                log_kv!(
                    self.logger,
                    Severity::Error,
                    Facility::Transport,
                    "Bind failed",
                    "iface" => &iface.name,
                    "error" => &e.to_string()
                );
                for index in self.bound.drain(..) {
                    self.transport.unbind(index);
                }
                return Err(e.into());
            }
            self.bound.push(iface.index);
            log_kv!(
                self.logger,
                Severity::Info,
                Facility::Transport,
                "Bound AIMF socket",
                "iface" => &iface.name,
                "addr" => &iface.address.to_string()
            );
        }

        self.running = true;
        self.epoch += 1;
        self.forward = true;

        let now = self.scheduler.now();
        self.send_hello();
        self.schedule(TimerRequest::new(
            TimerType::Hello { epoch: self.epoch },
            now + self.config.hello_interval(),
        ));
        self.schedule(TimerRequest::new(
            TimerType::Arbitration { epoch: self.epoch },
            now + self.config.initial_arbitration_delay(),
        ));
        self.rebuild_table();

        log_kv!(
            self.logger,
            Severity::Notice,
            Facility::Engine,
            "AIMF started",
            "willingness" => &self.willingness.to_string(),
            "interfaces" => &self.bound.len().to_string()
        );
        Ok(())
    }

    /// Close sockets, cancel periodic timers and drop all protocol state
    ///
    /// Expiry timers still queued find nothing and do nothing.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        for index in self.bound.drain(..) {
            self.transport.unbind(index);
        }
        self.repo.clear();
        let before = self.table.len();
        self.table.clear();
        self.table_resized(before);
        self.running = false;
        self.forward = false;
        self.last_arbitration = None;
        self.epoch += 1;
        log_notice!(self.logger, Facility::Engine, "AIMF stopped");
    }

    // ---------------- callbacks -------------------------------

    /// Dispatch a fired timer
    pub fn handle_timer(&mut self, timer: TimerType) {
        let now = self.scheduler.now();
        match timer {
            TimerType::Hello { epoch } => {
                if !self.is_current(epoch) {
                    return;
                }
                self.send_hello();
                self.schedule(TimerRequest::new(
                    TimerType::Hello { epoch },
                    now + self.config.hello_interval(),
                ));
            }
            TimerType::Arbitration { epoch } => {
                if !self.is_current(epoch) {
                    return;
                }
                self.run_arbitration();
                self.schedule(TimerRequest::new(
                    TimerType::Arbitration { epoch },
                    now + arbitration::arbitration_delay(
                        self.config.arbitration_interval(),
                        self.willingness,
                    ),
                ));
            }
            TimerType::NeighborExpiry { neighbor } => {
                match hello::neighbor_expired(&mut self.repo, neighbor, now) {
                    ExpiryOutcome::Erased(tuple) => {
                        self.stats.neighbors_expired += 1;
                        log_kv!(
                            self.logger,
                            Severity::Info,
                            Facility::Repository,
                            "Neighbor expired",
                            "neighbor" => &tuple.address.to_string()
                        );
                    }
                    ExpiryOutcome::Rescheduled(request) => self.schedule(request),
                    ExpiryOutcome::NotFound => {}
                }
            }
            TimerType::AssociationExpiry {
                advertiser,
                group,
                source,
            } => match hello::association_expired(&mut self.repo, advertiser, group, source, now)
            {
                ExpiryOutcome::Erased(_) => {
                    self.stats.associations_expired += 1;
                    log_kv!(
                        self.logger,
                        Severity::Info,
                        Facility::Repository,
                        "Association expired",
                        "advertiser" => &advertiser.to_string(),
                        "group" => &group.to_string(),
                        "source" => &source.to_string()
                    );
                    self.rebuild_table();
                }
                ExpiryOutcome::Rescheduled(request) => self.schedule(request),
                ExpiryOutcome::NotFound => {}
            },
            TimerType::GroupActivity { group } => {
                if let Some(request) = arbitration::group_activity_fired(&mut self.repo, group, now)
                {
                    self.schedule(request);
                } else {
                    log_kv!(
                        self.logger,
                        Severity::Debug,
                        Facility::Arbitration,
                        "Group quiet",
                        "group" => &group.to_string()
                    );
                }
            }
        }
    }

    /// Process a datagram received on `interface` from `sender`
    ///
    /// Malformed packets are logged, counted and dropped; nothing escapes
    /// to the caller.
    pub fn receive(&mut self, interface: u32, data: &[u8], sender: Ipv4Addr) {
        if !self.running {
            return;
        }
        self.stats.packets_received += 1;

        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed_packets += 1;
                log_kv!(
                    self.logger,
                    Severity::Warning,
                    Facility::Engine,
                    "Dropping malformed packet",
                    "sender" => &sender.to_string(),
                    "error" => &e.to_string()
                );
                return;
            }
        };

        let snapshot = PacketSnapshot {
            node_id: self.ctx.node_id(),
            interface,
            peer: sender,
            size: data.len(),
            packet: packet.clone(),
        };
        for observer in &mut self.observers {
            observer.packet_received(&snapshot);
        }

        let now = self.scheduler.now();
        for message in packet.messages {
            let header = message.header;
            if header.ttl == 0 || self.is_own_address(header.originator) {
                self.stats.messages_dropped += 1;
                continue;
            }
            match message.body {
                MessageBody::Hello(hello) => {
                    self.stats.messages_received += 1;
                    let outcome =
                        hello::process_hello(&mut self.repo, header.originator, &hello, header.validity(), now);
                    if outcome.neighbor_created {
                        self.stats.neighbors_created += 1;
                        log_kv!(
                            self.logger,
                            Severity::Info,
                            Facility::Repository,
                            "Neighbor added",
                            "neighbor" => &header.originator.to_string(),
                            "willingness" => &hello.willingness.to_string()
                        );
                    }
                    for assoc in &outcome.associations_created {
                        self.stats.associations_created += 1;
                        log_kv!(
                            self.logger,
                            Severity::Info,
                            Facility::Repository,
                            "Association learned",
                            "advertiser" => &assoc.advertiser.to_string(),
                            "group" => &assoc.group.to_string(),
                            "source" => &assoc.source.to_string()
                        );
                    }
                    for request in outcome.timers {
                        self.schedule(request);
                    }
                    log_kv!(
                        self.logger,
                        Severity::Debug,
                        Facility::Hello,
                        "HELLO received",
                        "from" => &header.originator.to_string(),
                        "seq" => &header.sequence_number.to_string()
                    );
                }
                MessageBody::Unknown(_) => {
                    self.stats.unknown_messages += 1;
                    log_kv!(
                        self.logger,
                        Severity::Debug,
                        Facility::Engine,
                        "Ignoring unknown message type",
                        "type" => &header.message_type.to_string(),
                        "from" => &header.originator.to_string()
                    );
                }
            }
        }

        self.rebuild_table();
    }

    /// Look up a multicast data packet and decide whether to forward it
    ///
    /// A hit always feeds the group liveness state, even when forwarding is
    /// suppressed.
    pub fn route_multicast(
        &mut self,
        origin: Ipv4Addr,
        group: Ipv4Addr,
        interface: InterfaceSelector,
    ) -> MulticastDecision {
        let Some(entry) = self.table.lookup(origin, group, interface).cloned() else {
            return MulticastDecision::NoRoute;
        };

        let now = self.scheduler.now();
        let update = arbitration::note_possible_activity(
            &mut self.repo,
            group,
            self.config.activity_base_window(),
            self.willingness,
            now,
        );
        if update.activity == Activity::Quiet {
            log_kv!(
                self.logger,
                Severity::Debug,
                Facility::Arbitration,
                "Group seen after quiet period",
                "group" => &group.to_string()
            );
        }
        if let Some(request) = update.timer {
            self.schedule(request);
        }

        let snapshot = MulticastSnapshot {
            node_id: self.ctx.node_id(),
            origin,
            group,
            interface: match interface {
                InterfaceSelector::Any => None,
                InterfaceSelector::Index(index) => Some(index),
            },
            entry: entry.clone(),
        };
        for observer in &mut self.observers {
            observer.multicast_received(&snapshot);
        }

        if !self.is_forwarding() {
            self.stats.multicast_suppressed += 1;
            return MulticastDecision::Suppressed(entry);
        }

        self.stats.multicast_forwarded += 1;
        for observer in &mut self.observers {
            observer.multicast_forwarded(&snapshot);
        }
        MulticastDecision::Forward(entry)
    }

    // ---------------- operator API -------------------------------

    /// Change own willingness and advertise it immediately
    pub fn set_willingness(&mut self, value: u8) -> Result<(), EngineError> {
        let willingness = Willingness::new(value)?;
        self.willingness = willingness;
        self.repo.set_local_willingness(willingness);
        log_kv!(
            self.logger,
            Severity::Notice,
            Facility::Engine,
            "Willingness changed",
            "willingness" => &willingness.to_string()
        );
        if self.running {
            self.send_hello();
        }
        Ok(())
    }

    /// Declare interest in (group, source); false if already present
    pub fn add_local_association(
        &mut self,
        group: Ipv4Addr,
        source: Ipv4Addr,
    ) -> Result<bool, EngineError> {
        validate_multicast_group(group, "group").map_err(ConfigError::InvalidAddress)?;
        validate_association_source(source, "source").map_err(ConfigError::InvalidAddress)?;

        let inserted = self.repo.insert_association(Association {
            group,
            source,
            advertiser: self.ctx.main_address(),
            willingness: self.willingness,
        });
        if !inserted {
            log_kv!(
                self.logger,
                Severity::Info,
                Facility::Repository,
                "Local association already exists",
                "group" => &group.to_string(),
                "source" => &source.to_string()
            );
            return Ok(false);
        }

        log_kv!(
            self.logger,
            Severity::Info,
            Facility::Repository,
            "Local association added",
            "group" => &group.to_string(),
            "source" => &source.to_string()
        );
        self.rebuild_table();
        Ok(true)
    }

    /// Withdraw interest in (group, source); false if it was not present
    pub fn remove_local_association(&mut self, group: Ipv4Addr, source: Ipv4Addr) -> bool {
        if self.repo.erase_association(group, source).is_none() {
            return false;
        }
        self.rebuild_table();
        if !self.repo.has_local_group(group) {
            self.repo.erase_group_timer(group);
        }
        log_kv!(
            self.logger,
            Severity::Info,
            Facility::Repository,
            "Local association removed",
            "group" => &group.to_string(),
            "source" => &source.to_string()
        );
        true
    }

    /// Administrative override: while suspended the node never forwards
    pub fn set_forwarding_suspended(&mut self, suspended: bool) {
        if self.suspended != suspended {
            self.suspended = suspended;
            log_notice!(
                self.logger,
                Facility::Forwarding,
                if suspended {
                    "Forwarding suspended"
                } else {
                    "Forwarding resumed"
                }
            );
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    // ---------------- queries -------------------------------

    pub fn forwarding_table_snapshot(&self) -> Vec<ForwardingEntry> {
        self.table.snapshot()
    }

    pub fn forwarding_table(&self) -> &ForwardingTable {
        &self.table
    }

    /// Forward flag after the administrative override
    pub fn is_forwarding(&self) -> bool {
        self.forward && !self.suspended
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn willingness(&self) -> Willingness {
        self.willingness
    }

    pub fn is_group_active(&self, group: Ipv4Addr) -> bool {
        arbitration::is_group_active(&self.repo, group, self.scheduler.now())
    }

    pub fn last_arbitration(&self) -> Option<&ArbitrationOutcome> {
        self.last_arbitration.as_ref()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn routes(&self) -> &R {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut R {
        &mut self.routes
    }

    // ---------------- internals -------------------------------

    fn is_current(&self, epoch: u64) -> bool {
        self.running && epoch == self.epoch
    }

    fn is_own_address(&self, address: Ipv4Addr) -> bool {
        address == self.ctx.main_address()
            || self.ctx.interfaces().iter().any(|i| i.address == address)
    }

    fn schedule(&mut self, request: TimerRequest) {
        self.scheduler
            .schedule_at(request.fire_at, request.timer_type);
    }

    fn next_packet_sequence(&mut self) -> u16 {
        self.packet_sequence = self.packet_sequence.wrapping_add(1);
        self.packet_sequence
    }

    fn next_message_sequence(&mut self) -> u16 {
        self.message_sequence = self.message_sequence.wrapping_add(1);
        self.message_sequence
    }

    /// Send one HELLO packet on every bound interface
    fn send_hello(&mut self) {
        let message_sequence = self.next_message_sequence();
        let message = hello::build_hello(
            self.ctx.main_address(),
            self.willingness,
            self.repo.associations(),
            self.config.hello_interval(),
            self.config.neighbor_hold_time(),
            self.config.message_ttl,
            message_sequence,
        );
        let packet_sequence = self.next_packet_sequence();
        let packet = Packet::new(packet_sequence, vec![message]);
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                log_error!(
                    self.logger,
                    Facility::Hello,
                    &format!("Failed to encode HELLO: {}", e)
                );
                return;
            }
        };
        self.stats.messages_sent += 1;

        let destination = SocketAddrV4::new(AIMF_HELLO_GROUP, AIMF_PORT);
        for index in self.bound.clone() {
            match self.transport.send(index, &bytes, destination) {
                Ok(()) => {
                    self.stats.packets_sent += 1;
                    let snapshot = PacketSnapshot {
                        node_id: self.ctx.node_id(),
                        interface: index,
                        peer: AIMF_HELLO_GROUP,
                        size: bytes.len(),
                        packet: packet.clone(),
                    };
                    for observer in &mut self.observers {
                        observer.packet_sent(&snapshot);
                    }
                }
                Err(e) => {
                    self.stats.send_errors += 1;
                    log_kv!(
                        self.logger,
                        Severity::Error,
                        Facility::Transport,
                        "HELLO send failed",
                        "iface" => &index.to_string(),
                        "error" => &e.to_string()
                    );
                }
            }
        }
        log_kv!(
            self.logger,
            Severity::Debug,
            Facility::Hello,
            "HELLO sent",
            "seq" => &message_sequence.to_string(),
            "associations" => &self.repo.associations().len().to_string()
        );
    }

    fn run_arbitration(&mut self) {
        // a tuple past its deadline may still await its expiry timer
        let now = self.scheduler.now();
        let live: Vec<NeighborTuple> = self
            .repo
            .neighbors()
            .iter()
            .filter(|n| !n.is_expired(now))
            .cloned()
            .collect();
        let routes = &self.routes;
        let outcome = arbitration::arbitrate(
            self.willingness,
            self.ctx.main_address(),
            &live,
            |neighbor| routes.lookup_route(neighbor).is_some(),
            self.config.tie_break,
        );
        self.stats.arbitration_runs += 1;

        if outcome.forward != self.forward {
            log_kv!(
                self.logger,
                Severity::Notice,
                Facility::Arbitration,
                if outcome.forward {
                    "Now forwarding"
                } else {
                    "No longer forwarding"
                },
                "reason" => &format!("{:?}", outcome.reason)
            );
            for observer in &mut self.observers {
                observer.forwarding_changed(self.ctx.node_id(), &outcome);
            }
        }
        self.forward = outcome.forward;
        self.last_arbitration = Some(outcome);
    }

    /// Recompute the forwarding table from the repository
    fn rebuild_table(&mut self) {
        let before = self.table.len();
        self.table.rebuild(
            self.repo.associations(),
            self.repo.association_set(),
            self.ctx.input_interface(),
            &self.ctx.manet_interfaces(),
        );
        self.stats.table_rebuilds += 1;
        self.table_resized(before);
    }

    fn table_resized(&mut self, before: usize) {
        let after = self.table.len();
        if before == after {
            return;
        }
        log_kv!(
            self.logger,
            Severity::Debug,
            Facility::Forwarding,
            "Forwarding table size changed",
            "size" => &after.to_string()
        );
        for observer in &mut self.observers {
            observer.table_size_changed(self.ctx.node_id(), after);
        }
    }
}
