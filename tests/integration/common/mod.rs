// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Shared helpers for building simulated topologies.

#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::time::Duration;

use aimf::config::ProtocolConfig;
use aimf::logging::Logger;
use aimf::protocols::arbitration::TieBreak;
use aimf::routes::{StaticRoute, StaticRoutes};
use aimf::sim::{single_interface_context, Endpoint, NodeIndex, SimNetwork};
use aimf::Willingness;

pub const X: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const Y: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const Z: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

pub const GROUP: Ipv4Addr = Ipv4Addr::new(225, 1, 2, 4);
pub const SOURCE: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 2);

/// The MANET interface index every simulated node uses
pub const WLAN: u32 = 1;

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

pub fn network() -> SimNetwork {
    SimNetwork::new(Logger::null())
}

pub fn config(willingness: u8) -> ProtocolConfig {
    ProtocolConfig {
        willingness: Willingness::new(willingness).unwrap(),
        ..Default::default()
    }
}

pub fn config_with_tie_break(willingness: u8, tie_break: TieBreak) -> ProtocolConfig {
    ProtocolConfig {
        tie_break,
        ..config(willingness)
    }
}

/// Host routes on the MANET interface to each of `reachable`
pub fn routes_to(reachable: &[Ipv4Addr]) -> StaticRoutes {
    reachable
        .iter()
        .map(|addr| StaticRoute::host(*addr, WLAN))
        .collect()
}

/// Add a node whose unicast table reaches `reachable`
pub fn add_node(
    net: &mut SimNetwork,
    address: Ipv4Addr,
    config: ProtocolConfig,
    reachable: &[Ipv4Addr],
) -> NodeIndex {
    let id = u32::from(address.octets()[3]);
    net.add_node(
        single_interface_context(id, address),
        config,
        routes_to(reachable),
    )
    .unwrap()
}

pub fn link(net: &mut SimNetwork, a: NodeIndex, b: NodeIndex) {
    net.connect(Endpoint::new(a, WLAN), Endpoint::new(b, WLAN));
}

pub fn unlink(net: &mut SimNetwork, a: NodeIndex, b: NodeIndex) {
    assert!(net.disconnect(Endpoint::new(a, WLAN), Endpoint::new(b, WLAN)));
}

/// Two linked nodes that can route to each other
pub fn pair(willingness_x: u8, willingness_y: u8) -> (SimNetwork, NodeIndex, NodeIndex) {
    let mut net = network();
    let x = add_node(&mut net, X, config(willingness_x), &[Y]);
    let y = add_node(&mut net, Y, config(willingness_y), &[X]);
    link(&mut net, x, y);
    (net, x, y)
}
