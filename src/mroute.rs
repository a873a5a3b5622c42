// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Multicast forwarding table
//!
//! The table is derived state: every recomputation clears it and re-inserts
//! one entry per local association and per learned association tuple. Entries
//! are never patched in place, so nothing stale survives a rebuild.
//!
//! ## Lookup
//!
//! A packet from `origin` to `group` arriving on an interface matches an
//! entry when the group matches, the source is `origin` or the wildcard
//! `0.0.0.0`, and the entry's input interface equals the arrival interface
//! (or the caller passes [`InterfaceSelector::Any`]). Source-specific entries
//! win over wildcard ones.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::protocols::repository::{Association, AssociationTuple};

/// One (group, source) forwarding entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardingEntry {
    pub group: Ipv4Addr,
    pub source: Ipv4Addr,
    pub input_interface: u32,
    pub output_interfaces: Vec<u32>,
}

/// Arrival interface of a packet being looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceSelector {
    /// Match regardless of input interface
    Any,
    Index(u32),
}

impl InterfaceSelector {
    fn matches(self, input_interface: u32) -> bool {
        match self {
            InterfaceSelector::Any => true,
            InterfaceSelector::Index(index) => index == input_interface,
        }
    }
}

/// Forwarding table keyed by (group, source)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ForwardingTable {
    entries: BTreeMap<(Ipv4Addr, Ipv4Addr), ForwardingEntry>,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table from the repository contents
    ///
    /// Without an input interface no entry can be resolved and the table is
    /// left empty.
    pub fn rebuild(
        &mut self,
        local: &[Association],
        learned: &[AssociationTuple],
        input_interface: Option<u32>,
        output_interfaces: &[u32],
    ) {
        self.entries.clear();
        let Some(input_interface) = input_interface else {
            return;
        };

        let pairs = local
            .iter()
            .map(|a| (a.group, a.source))
            .chain(learned.iter().map(|t| (t.association.group, t.association.source)));

        for (group, source) in pairs {
            self.entries.insert(
                (group, source),
                ForwardingEntry {
                    group,
                    source,
                    input_interface,
                    output_interfaces: output_interfaces.to_vec(),
                },
            );
        }
    }

    /// Find the entry a packet from `origin` to `group` should use
    pub fn lookup(
        &self,
        origin: Ipv4Addr,
        group: Ipv4Addr,
        interface: InterfaceSelector,
    ) -> Option<&ForwardingEntry> {
        [origin, Ipv4Addr::UNSPECIFIED]
            .iter()
            .filter_map(|source| self.entries.get(&(group, *source)))
            .find(|entry| interface.matches(entry.input_interface))
    }

    pub fn get(&self, group: Ipv4Addr, source: Ipv4Addr) -> Option<&ForwardingEntry> {
        self.entries.get(&(group, source))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &ForwardingEntry> {
        self.entries.values()
    }

    /// Copy of the current entries, ordered by (group, source)
    pub fn snapshot(&self) -> Vec<ForwardingEntry> {
        self.entries.values().cloned().collect()
    }
}

impl fmt::Display for ForwardingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source\t\tGroup\t\tInput\tOutputs")?;
        for entry in self.entries.values() {
            let outputs: Vec<String> = entry
                .output_interfaces
                .iter()
                .map(|i| i.to_string())
                .collect();
            writeln!(
                f,
                "{}\t{}\t{}\t{}",
                entry.source,
                entry.group,
                entry.input_interface,
                outputs.join(",")
            )?;
        }
        Ok(())
    }
}
