// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Soft-state repository
//!
//! Pure in-memory tables, no timing logic:
//!
//! | Table | Key | Lifetime |
//! |-------|-----|----------|
//! | neighbor set | neighbor address | refreshed by HELLO, erased on expiry |
//! | association set | (advertiser, group, source) | refreshed by HELLO, erased on expiry |
//! | local associations | (group, source) | until explicitly removed |
//! | group timers | group | owned by the liveness logic |
//!
//! Lookups are linear scans; deployments have tens of neighbors.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::{Timestamp, Willingness};

/// A known one-hop neighbor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighborTuple {
    pub address: Ipv4Addr,
    pub willingness: Willingness,
    pub expires_at: Timestamp,
}

impl NeighborTuple {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// A (group, source) interest together with who advertised it
///
/// Local associations use the node's own address as advertiser, so local
/// and learned associations share one representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Association {
    pub group: Ipv4Addr,
    pub source: Ipv4Addr,
    pub advertiser: Ipv4Addr,
    pub willingness: Willingness,
}

impl Association {
    pub fn matches(&self, advertiser: Ipv4Addr, group: Ipv4Addr, source: Ipv4Addr) -> bool {
        self.advertiser == advertiser && self.group == group && self.source == source
    }
}

/// An association learned from a neighbor's HELLO
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationTuple {
    pub association: Association,
    pub expires_at: Timestamp,
}

impl AssociationTuple {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// State of a group's liveness timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimerState {
    /// Callback scheduled for the deadline
    Armed(Timestamp),
    /// Deadline passed without the group being seen
    Fired(Timestamp),
}

impl TimerState {
    pub fn deadline(&self) -> Timestamp {
        match self {
            TimerState::Armed(at) | TimerState::Fired(at) => *at,
        }
    }
}

/// Soft-state tables of one protocol instance
#[derive(Debug, Default)]
pub struct Repository {
    neighbors: Vec<NeighborTuple>,
    association_set: Vec<AssociationTuple>,
    associations: Vec<Association>,
    group_timers: BTreeMap<Ipv4Addr, TimerState>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------- neighbors -------------------------------

    pub fn neighbors(&self) -> &[NeighborTuple] {
        &self.neighbors
    }

    pub fn find_neighbor(&self, address: Ipv4Addr) -> Option<&NeighborTuple> {
        self.neighbors.iter().find(|n| n.address == address)
    }

    pub fn find_neighbor_mut(&mut self, address: Ipv4Addr) -> Option<&mut NeighborTuple> {
        self.neighbors.iter_mut().find(|n| n.address == address)
    }

    /// Insert or replace the tuple for `tuple.address`; true if it was new
    pub fn insert_neighbor(&mut self, tuple: NeighborTuple) -> bool {
        match self.find_neighbor_mut(tuple.address) {
            Some(existing) => {
                *existing = tuple;
                false
            }
            None => {
                self.neighbors.push(tuple);
                true
            }
        }
    }

    pub fn erase_neighbor(&mut self, address: Ipv4Addr) -> Option<NeighborTuple> {
        let pos = self.neighbors.iter().position(|n| n.address == address)?;
        Some(self.neighbors.remove(pos))
    }

    /// Highest willingness among known neighbors
    pub fn willingness_ceiling(&self) -> Option<Willingness> {
        self.neighbors.iter().map(|n| n.willingness).max()
    }

    // ---------------- learned associations -------------------------------

    /// Associations learned from the network
    pub fn association_set(&self) -> &[AssociationTuple] {
        &self.association_set
    }

    pub fn find_association_tuple(
        &self,
        advertiser: Ipv4Addr,
        group: Ipv4Addr,
        source: Ipv4Addr,
    ) -> Option<&AssociationTuple> {
        self.association_set
            .iter()
            .find(|t| t.association.matches(advertiser, group, source))
    }

    pub fn find_association_tuple_mut(
        &mut self,
        advertiser: Ipv4Addr,
        group: Ipv4Addr,
        source: Ipv4Addr,
    ) -> Option<&mut AssociationTuple> {
        self.association_set
            .iter_mut()
            .find(|t| t.association.matches(advertiser, group, source))
    }

    /// Insert or replace by (advertiser, group, source); true if it was new
    pub fn insert_association_tuple(&mut self, tuple: AssociationTuple) -> bool {
        let Association {
            advertiser,
            group,
            source,
            ..
        } = tuple.association;
        match self.find_association_tuple_mut(advertiser, group, source) {
            Some(existing) => {
                *existing = tuple;
                false
            }
            None => {
                self.association_set.push(tuple);
                true
            }
        }
    }

    pub fn erase_association_tuple(
        &mut self,
        advertiser: Ipv4Addr,
        group: Ipv4Addr,
        source: Ipv4Addr,
    ) -> Option<AssociationTuple> {
        let pos = self
            .association_set
            .iter()
            .position(|t| t.association.matches(advertiser, group, source))?;
        Some(self.association_set.remove(pos))
    }

    // ---------------- local associations -------------------------------

    /// Associations this node itself wants forwarded
    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub fn find_association(&self, group: Ipv4Addr, source: Ipv4Addr) -> Option<&Association> {
        self.associations
            .iter()
            .find(|a| a.group == group && a.source == source)
    }

    /// Add a local association; false if (group, source) is already present
    pub fn insert_association(&mut self, association: Association) -> bool {
        if self
            .find_association(association.group, association.source)
            .is_some()
        {
            return false;
        }
        self.associations.push(association);
        true
    }

    pub fn erase_association(&mut self, group: Ipv4Addr, source: Ipv4Addr) -> Option<Association> {
        let pos = self
            .associations
            .iter()
            .position(|a| a.group == group && a.source == source)?;
        Some(self.associations.remove(pos))
    }

    /// Whether any local association names `group`
    pub fn has_local_group(&self, group: Ipv4Addr) -> bool {
        self.associations.iter().any(|a| a.group == group)
    }

    /// Rewrite the willingness carried by local associations
    pub fn set_local_willingness(&mut self, willingness: Willingness) {
        for association in &mut self.associations {
            association.willingness = willingness;
        }
    }

    // ---------------- group timers -------------------------------

    pub fn group_timer(&self, group: Ipv4Addr) -> Option<TimerState> {
        self.group_timers.get(&group).copied()
    }

    pub fn set_group_timer(&mut self, group: Ipv4Addr, state: TimerState) {
        self.group_timers.insert(group, state);
    }

    pub fn erase_group_timer(&mut self, group: Ipv4Addr) -> Option<TimerState> {
        self.group_timers.remove(&group)
    }

    pub fn group_timers(&self) -> impl Iterator<Item = (Ipv4Addr, TimerState)> + '_ {
        self.group_timers.iter().map(|(g, s)| (*g, *s))
    }

    /// Drop every table
    pub fn clear(&mut self) {
        self.neighbors.clear();
        self.association_set.clear();
        self.associations.clear();
        self.group_timers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
            && self.association_set.is_empty()
            && self.associations.is_empty()
            && self.group_timers.is_empty()
    }
}
