// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Deterministic discrete-event harness
//!
//! A [`SimNetwork`] owns several engines that share one virtual clock and one
//! event queue. Engines see the network only through [`SimScheduler`] and
//! [`SimTransport`], the same collaborator traits the daemon implements over
//! tokio and UDP, so a scenario exercises exactly the code that runs live.
//!
//! Events fire in `(time, insertion order)` order. A packet sent on an
//! interface is delivered after [`DEFAULT_LINK_LATENCY`] to every bound
//! interface linked to it with [`SimNetwork::connect`].

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;
use std::time::Duration;

use crate::config::ProtocolConfig;
use crate::engine::{EngineError, ProtocolEngine, Scheduler, Transport, TransportError};
use crate::logging::{Facility, Logger, Severity};
use crate::protocols::TimerType;
use crate::routes::StaticRoutes;
use crate::{NetworkInterface, NodeContext, Timestamp};

/// Propagation delay of every simulated link
pub const DEFAULT_LINK_LATENCY: Duration = Duration::from_millis(1);

/// Index of a node inside a [`SimNetwork`]
pub type NodeIndex = usize;

/// One interface of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub node: NodeIndex,
    pub interface: u32,
}

impl Endpoint {
    pub fn new(node: NodeIndex, interface: u32) -> Self {
        Self { node, interface }
    }
}

#[derive(Debug)]
enum EventKind {
    Timer(TimerType),
    Delivery {
        interface: u32,
        sender: Ipv4Addr,
        payload: Vec<u8>,
    },
}

#[derive(Debug)]
struct Event {
    at: Timestamp,
    sequence: u64,
    node: NodeIndex,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.sequence == other.sequence
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// Shared clock, event queue and link topology
#[derive(Debug, Default)]
struct SimCore {
    now: Timestamp,
    next_sequence: u64,
    queue: BinaryHeap<Reverse<Event>>,
    links: BTreeSet<(Endpoint, Endpoint)>,
    /// Bound endpoints and the address they send from
    bound: HashMap<Endpoint, Ipv4Addr>,
    latency: Duration,
    delivered: u64,
}

impl SimCore {
    fn push(&mut self, at: Timestamp, node: NodeIndex, kind: EventKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(Reverse(Event {
            at,
            sequence,
            node,
            kind,
        }));
    }

    fn peers(&self, from: Endpoint) -> Vec<Endpoint> {
        self.links
            .iter()
            .filter_map(|(a, b)| {
                if *a == from {
                    Some(*b)
                } else if *b == from {
                    Some(*a)
                } else {
                    None
                }
            })
            .collect()
    }
}

fn link_key(a: Endpoint, b: Endpoint) -> (Endpoint, Endpoint) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Scheduler handle for one node
#[derive(Debug, Clone)]
pub struct SimScheduler {
    node: NodeIndex,
    core: Rc<RefCell<SimCore>>,
}

impl Scheduler for SimScheduler {
    fn now(&self) -> Timestamp {
        self.core.borrow().now
    }

    fn schedule_at(&mut self, at: Timestamp, timer: TimerType) {
        let mut core = self.core.borrow_mut();
        // a deadline in the past fires at the current instant
        let at = at.max(core.now);
        core.push(at, self.node, EventKind::Timer(timer));
    }
}

/// Transport handle for one node
#[derive(Debug, Clone)]
pub struct SimTransport {
    node: NodeIndex,
    core: Rc<RefCell<SimCore>>,
    sent: u64,
}

impl SimTransport {
    /// Packets handed to the medium by this node
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Transport for SimTransport {
    fn bind(&mut self, interface: &NetworkInterface, _port: u16) -> Result<(), TransportError> {
        let endpoint = Endpoint::new(self.node, interface.index);
        self.core
            .borrow_mut()
            .bound
            .insert(endpoint, interface.address);
        Ok(())
    }

    fn unbind(&mut self, interface: u32) {
        self.core
            .borrow_mut()
            .bound
            .remove(&Endpoint::new(self.node, interface));
    }

    fn send(
        &mut self,
        interface: u32,
        payload: &[u8],
        _destination: SocketAddrV4,
    ) -> Result<(), TransportError> {
        let from = Endpoint::new(self.node, interface);
        let mut core = self.core.borrow_mut();
        let sender = *core
            .bound
            .get(&from)
            .ok_or(TransportError::NotBound(interface))?;
        let at = core.now + core.latency;
        for peer in core.peers(from) {
            // unbound receivers drop the packet on arrival
            core.push(
                at,
                peer.node,
                EventKind::Delivery {
                    interface: peer.interface,
                    sender,
                    payload: payload.to_vec(),
                },
            );
        }
        self.sent += 1;
        Ok(())
    }
}

/// Engine type driven by the simulator
pub type SimEngine = ProtocolEngine<SimScheduler, SimTransport, StaticRoutes>;

/// A set of engines on a shared virtual clock
pub struct SimNetwork {
    core: Rc<RefCell<SimCore>>,
    nodes: Vec<SimEngine>,
    logger: Logger,
}

impl SimNetwork {
    pub fn new(logger: Logger) -> Self {
        let core = SimCore {
            latency: DEFAULT_LINK_LATENCY,
            ..Default::default()
        };
        Self {
            core: Rc::new(RefCell::new(core)),
            nodes: Vec::new(),
            logger,
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.core.borrow_mut().latency = latency;
        self
    }

    /// Create an engine for `ctx`; it is not started
    pub fn add_node(
        &mut self,
        ctx: NodeContext,
        config: ProtocolConfig,
        routes: StaticRoutes,
    ) -> Result<NodeIndex, EngineError> {
        let node = self.nodes.len();
        let scheduler = SimScheduler {
            node,
            core: self.core.clone(),
        };
        let transport = SimTransport {
            node,
            core: self.core.clone(),
            sent: 0,
        };
        let engine = ProtocolEngine::new(
            ctx,
            config,
            scheduler,
            transport,
            routes,
            self.logger.clone(),
        )?;
        self.nodes.push(engine);
        Ok(node)
    }

    /// Link two interfaces so packets sent on one reach the other
    pub fn connect(&mut self, a: Endpoint, b: Endpoint) {
        self.core.borrow_mut().links.insert(link_key(a, b));
    }

    pub fn disconnect(&mut self, a: Endpoint, b: Endpoint) -> bool {
        self.core.borrow_mut().links.remove(&link_key(a, b))
    }

    pub fn start_all(&mut self) -> Result<(), EngineError> {
        for engine in &mut self.nodes {
            engine.start()?;
        }
        Ok(())
    }

    pub fn node(&self, index: NodeIndex) -> &SimEngine {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut SimEngine {
        &mut self.nodes[index]
    }

    pub fn nodes(&self) -> &[SimEngine] {
        &self.nodes
    }

    pub fn now(&self) -> Timestamp {
        self.core.borrow().now
    }

    pub fn pending_events(&self) -> usize {
        self.core.borrow().queue.len()
    }

    /// Packets handed to receivers so far
    pub fn delivered(&self) -> u64 {
        self.core.borrow().delivered
    }

    /// Fire the next event, if any; returns false when the queue is empty
    pub fn step(&mut self) -> bool {
        let next = self.core.borrow_mut().queue.pop();
        let Some(Reverse(event)) = next else {
            return false;
        };
        self.dispatch(event);
        true
    }

    /// Fire every event due at or before `until`, then park the clock there
    pub fn run_until(&mut self, until: Timestamp) {
        loop {
            let next = {
                let mut core = self.core.borrow_mut();
                let due = core
                    .queue
                    .peek()
                    .map_or(false, |Reverse(event)| event.at <= until);
                if due {
                    core.queue.pop()
                } else {
                    None
                }
            };
            match next {
                Some(Reverse(event)) => self.dispatch(event),
                None => break,
            }
        }
        let mut core = self.core.borrow_mut();
        core.now = core.now.max(until);
    }

    pub fn run_for(&mut self, duration: Duration) {
        let until = self.now() + duration;
        self.run_until(until);
    }

    fn dispatch(&mut self, event: Event) {
        // the core borrow must be released before the engine runs
        let bound = {
            let mut core = self.core.borrow_mut();
            core.now = event.at;
            match &event.kind {
                EventKind::Delivery { interface, .. } => core
                    .bound
                    .contains_key(&Endpoint::new(event.node, *interface)),
                EventKind::Timer(_) => true,
            }
        };

        let Some(engine) = self.nodes.get_mut(event.node) else {
            log_kv!(
                self.logger,
                Severity::Warning,
                Facility::Test,
                "Event for unknown node",
                "node" => &event.node.to_string()
            );
            return;
        };

        match event.kind {
            EventKind::Timer(timer) => engine.handle_timer(timer),
            EventKind::Delivery {
                interface,
                sender,
                payload,
            } => {
                if !bound {
                    return;
                }
                self.core.borrow_mut().delivered += 1;
                engine.receive(interface, &payload, sender);
            }
        }
    }
}

/// Context for a node with one MANET interface (index 1) addressed `address`
pub fn single_interface_context(node_id: u32, address: Ipv4Addr) -> NodeContext {
    NodeContext::new(
        node_id,
        address,
        vec![
            NetworkInterface::new(0, "lo", Ipv4Addr::LOCALHOST),
            NetworkInterface::new(1, "wlan0", address),
        ],
    )
}
