// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Interface discovery and config resolution
//!
//! Names in the configuration are resolved against the host inventory once,
//! at startup; the engine only ever sees interface indices.

use std::net::IpAddr;

use crate::config::{Config, ConfigError};
use crate::routes::{StaticRoute, StaticRoutes};
use crate::{NetworkInterface, NodeContext};

/// Enumerate host interfaces that carry an IPv4 address
///
/// An interface with several IPv4 addresses is represented by the first one.
pub fn discover_interfaces() -> Vec<NetworkInterface> {
    pnet::datalink::interfaces()
        .into_iter()
        .filter_map(|iface| {
            let address = iface.ips.iter().find_map(|ip| match ip.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })?;
            Some(NetworkInterface::new(iface.index, iface.name, address))
        })
        .collect()
}

/// Map interface names to indices
pub fn resolve_names(
    inventory: &[NetworkInterface],
    names: &[String],
) -> Result<Vec<u32>, ConfigError> {
    names
        .iter()
        .map(|name| {
            inventory
                .iter()
                .find(|i| &i.name == name)
                .map(|i| i.index)
                .ok_or_else(|| ConfigError::UnknownInterface(name.clone()))
        })
        .collect()
}

/// Build the node context from the configuration and host inventory
///
/// The main address is the first interface that is neither loopback nor
/// excluded. Without a configured node id the main address's host order
/// value is used.
pub fn build_context(
    config: &Config,
    inventory: Vec<NetworkInterface>,
) -> Result<NodeContext, ConfigError> {
    let excluded = resolve_names(&inventory, &config.interfaces.exclude)?;
    let main_address = inventory
        .iter()
        .find(|i| !i.is_loopback && !excluded.contains(&i.index))
        .map(|i| i.address)
        .ok_or(ConfigError::NoUsableInterface)?;
    let node_id = config.node_id.unwrap_or_else(|| u32::from(main_address));

    let manet = if config.interfaces.manet.is_empty() {
        None
    } else {
        Some(resolve_names(&inventory, &config.interfaces.manet)?)
    };

    let ctx = NodeContext::new(node_id, main_address, inventory).with_excluded(excluded)?;
    match manet {
        Some(manet) => ctx.with_manet(manet),
        None => Ok(ctx),
    }
}

/// Resolve the configured static routes against the node's interfaces
pub fn build_routes(config: &Config, ctx: &NodeContext) -> Result<StaticRoutes, ConfigError> {
    config
        .routes
        .iter()
        .map(|route| {
            let interface = ctx
                .interfaces()
                .iter()
                .find(|i| i.name == route.interface)
                .ok_or_else(|| ConfigError::UnknownInterface(route.interface.clone()))?;
            Ok(StaticRoute {
                destination: route.destination,
                prefix_len: route.prefix_len,
                next_hop: route.next_hop,
                interface: interface.index,
                metric: route.metric,
            })
        })
        .collect()
}
