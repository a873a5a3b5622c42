// SPDX-License-Identifier: Apache-2.0 OR MIT
//! AIMF: soft-state multicast forwarding for wireless mesh networks.
//!
//! Nodes periodically exchange HELLO messages carrying a willingness value and
//! the (group, source) associations they want forwarded. From that soft state
//! each node builds a local multicast forwarding table and decides, by
//! comparing its willingness with that of its reachable neighbors, whether it
//! is the active forwarder for its region.
//!
//! ## Layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`protocols::wire`] | byte-exact packet/message codec and the 8-bit time code |
//! | [`protocols::repository`] | neighbor/association tuples, local associations, group timers |
//! | [`protocols::hello`] | HELLO build/process and tuple expiry decisions |
//! | [`protocols::arbitration`] | forwarder election and the group liveness window |
//! | [`mroute`] | forwarding table derived from the repository |
//! | [`engine`] | the protocol engine and its collaborator traits |
//! | [`sim`] | deterministic discrete-event scheduler and in-memory transport |
//! | [`runtime`] | tokio/UDP glue used by the `aimfd` daemon |

#[macro_use]
pub mod logging;

pub mod config;
pub mod engine;
pub mod mroute;
pub mod protocols;
pub mod routes;
pub mod runtime;
pub mod sim;
pub mod validation;

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Point in time measured from the scheduler's epoch
///
/// All protocol state is expressed against the collaborator scheduler's clock,
/// never the wall clock, so simulated and real time behave identically.
pub type Timestamp = Duration;

/// A node's preference (0-7) to act as multicast forwarder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Willingness(u8);

impl Willingness {
    /// Never forward
    pub const NEVER: Willingness = Willingness(0);
    pub const LOW: Willingness = Willingness(1);
    pub const DEFAULT: Willingness = Willingness(3);
    pub const HIGH: Willingness = Willingness(6);
    /// Always forward, regardless of neighbors
    pub const ALWAYS: Willingness = Willingness(7);

    /// Validate a raw willingness value
    pub fn new(value: u8) -> Result<Self, ConfigError> {
        if value > Self::ALWAYS.0 {
            return Err(ConfigError::InvalidWillingness(value));
        }
        Ok(Willingness(value))
    }

    /// Willingness as carried on the wire
    ///
    /// Values above 7 from a peer are clamped rather than rejected.
    pub fn from_wire(value: u8) -> Self {
        Willingness(value.min(Self::ALWAYS.0))
    }

    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Distance to [`Willingness::ALWAYS`], used to slow down eager timers
    #[inline]
    pub const fn deficit(self) -> u8 {
        Self::ALWAYS.0 - self.0
    }
}

impl Default for Willingness {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Willingness {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Willingness::new(value)
    }
}

impl From<Willingness> for u8 {
    fn from(w: Willingness) -> u8 {
        w.0
    }
}

impl fmt::Display for Willingness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the node's interface inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub index: u32,
    pub name: String,
    pub address: Ipv4Addr,
    #[serde(default)]
    pub is_loopback: bool,
}

impl NetworkInterface {
    pub fn new(index: u32, name: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            index,
            name: name.into(),
            address,
            is_loopback: address.is_loopback(),
        }
    }
}

/// Identity and interface inventory of the node an engine runs on
///
/// Passed to the engine at construction; nothing in the engine looks up
/// "which node am I" from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    node_id: u32,
    main_address: Ipv4Addr,
    interfaces: Vec<NetworkInterface>,
    excluded: BTreeSet<u32>,
    manet: Option<BTreeSet<u32>>,
}

impl NodeContext {
    /// Build a context in which every non-loopback interface participates
    /// and is MANET-facing
    pub fn new(node_id: u32, main_address: Ipv4Addr, interfaces: Vec<NetworkInterface>) -> Self {
        Self {
            node_id,
            main_address,
            interfaces,
            excluded: BTreeSet::new(),
            manet: None,
        }
    }

    /// Derive a context from an inventory, taking the first participating
    /// interface's address as the main address
    pub fn from_inventory(
        node_id: u32,
        interfaces: Vec<NetworkInterface>,
    ) -> Result<Self, ConfigError> {
        let main_address = interfaces
            .iter()
            .find(|i| !i.is_loopback)
            .map(|i| i.address)
            .ok_or(ConfigError::NoUsableInterface)?;
        Ok(Self::new(node_id, main_address, interfaces))
    }

    /// Remove interfaces from protocol participation
    pub fn with_excluded(
        mut self,
        indices: impl IntoIterator<Item = u32>,
    ) -> Result<Self, ConfigError> {
        let indices: BTreeSet<u32> = indices.into_iter().collect();
        self.check_known(&indices)?;
        if let Some(manet) = &self.manet {
            if let Some(both) = indices.intersection(manet).next() {
                return Err(ConfigError::ExcludedManetInterface(self.name_of(*both)));
            }
        }
        self.excluded = indices;
        Ok(self)
    }

    /// Restrict forwarding output to the given interfaces
    pub fn with_manet(mut self, indices: impl IntoIterator<Item = u32>) -> Result<Self, ConfigError> {
        let indices: BTreeSet<u32> = indices.into_iter().collect();
        self.check_known(&indices)?;
        if let Some(both) = indices.intersection(&self.excluded).next() {
            return Err(ConfigError::ExcludedManetInterface(self.name_of(*both)));
        }
        self.manet = Some(indices);
        Ok(self)
    }

    fn check_known(&self, indices: &BTreeSet<u32>) -> Result<(), ConfigError> {
        match indices.iter().find(|i| self.interface(**i).is_none()) {
            Some(unknown) => Err(ConfigError::UnknownInterfaceIndex(*unknown)),
            None => Ok(()),
        }
    }

    fn name_of(&self, index: u32) -> String {
        self.interface(index)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| index.to_string())
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn main_address(&self) -> Ipv4Addr {
        self.main_address
    }

    pub fn interfaces(&self) -> &[NetworkInterface] {
        &self.interfaces
    }

    pub fn interface(&self, index: u32) -> Option<&NetworkInterface> {
        self.interfaces.iter().find(|i| i.index == index)
    }

    pub fn is_excluded(&self, index: u32) -> bool {
        self.excluded.contains(&index)
    }

    /// Interfaces the protocol binds to: not loopback and not excluded
    pub fn participating_interfaces(&self) -> impl Iterator<Item = &NetworkInterface> {
        self.interfaces
            .iter()
            .filter(|i| !i.is_loopback && !self.excluded.contains(&i.index))
    }

    /// Output interfaces for forwarding table entries
    pub fn manet_interfaces(&self) -> Vec<u32> {
        match &self.manet {
            Some(manet) => manet.iter().copied().collect(),
            None => self.participating_interfaces().map(|i| i.index).collect(),
        }
    }

    /// Interface carrying the main address, used as input for every entry
    pub fn input_interface(&self) -> Option<u32> {
        self.interfaces
            .iter()
            .find(|i| i.address == self.main_address)
            .map(|i| i.index)
    }

    /// Label attached to every log line this node produces
    pub fn log_label(&self) -> String {
        format!("node {} {}", self.node_id, self.main_address)
    }
}
