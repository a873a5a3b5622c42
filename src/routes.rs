// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Static unicast route table
//!
//! Stands in for the host unicast routing protocol: arbitration only asks
//! whether a neighbor is reachable, and this table answers with a
//! longest-prefix match, lowest metric winning among equal prefixes.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::engine::{RouteLookup, UnicastRoute};

/// One network or host route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub destination: Ipv4Addr,
    pub prefix_len: u8,
    /// Gateway; `None` for on-link destinations
    pub next_hop: Option<Ipv4Addr>,
    pub interface: u32,
    pub metric: u32,
}

impl StaticRoute {
    /// Route to a single directly reachable host
    pub fn host(destination: Ipv4Addr, interface: u32) -> Self {
        Self {
            destination,
            prefix_len: 32,
            next_hop: None,
            interface,
            metric: 1,
        }
    }

    fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            len => u32::MAX << (32 - u32::from(len.min(32))),
        }
    }

    pub fn matches(&self, destination: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(destination) & mask == u32::from(self.destination) & mask
    }
}

/// Table of static routes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRoutes {
    routes: Vec<StaticRoute>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route, replacing one with the same prefix and interface
    pub fn add(&mut self, route: StaticRoute) {
        self.routes.retain(|r| {
            !(r.destination == route.destination
                && r.prefix_len == route.prefix_len
                && r.interface == route.interface)
        });
        self.routes.push(route);
    }

    /// Remove every route for exactly this prefix; returns how many
    pub fn remove(&mut self, destination: Ipv4Addr, prefix_len: u8) -> usize {
        let before = self.routes.len();
        self.routes
            .retain(|r| !(r.destination == destination && r.prefix_len == prefix_len));
        before - self.routes.len()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[StaticRoute] {
        &self.routes
    }

    fn best_match(&self, destination: Ipv4Addr) -> Option<&StaticRoute> {
        self.routes
            .iter()
            .filter(|r| r.matches(destination))
            // longest prefix first, then lowest metric
            .max_by(|a, b| {
                a.prefix_len
                    .cmp(&b.prefix_len)
                    .then_with(|| b.metric.cmp(&a.metric))
            })
    }
}

impl FromIterator<StaticRoute> for StaticRoutes {
    fn from_iter<I: IntoIterator<Item = StaticRoute>>(iter: I) -> Self {
        let mut table = StaticRoutes::new();
        for route in iter {
            table.add(route);
        }
        table
    }
}

impl RouteLookup for StaticRoutes {
    fn lookup_route(&self, destination: Ipv4Addr) -> Option<UnicastRoute> {
        self.best_match(destination).map(|route| UnicastRoute {
            destination,
            next_hop: route.next_hop.unwrap_or(destination),
            interface: route.interface,
        })
    }
}
