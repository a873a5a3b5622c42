// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Validation helpers shared by the config loader and the engine API.
//!
//! Each helper returns a human-readable reason on failure; callers wrap it
//! in their own error type.

use std::net::Ipv4Addr;
use std::time::Duration;

/// Maximum interface name length (Linux IFNAMSIZ - 1)
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Result type for validation functions
pub type ValidationResult = Result<(), String>;

/// Unicast: not multicast, broadcast or 0.0.0.0
#[inline]
pub fn is_valid_unicast(addr: Ipv4Addr) -> bool {
    !addr.is_multicast() && !addr.is_broadcast() && !addr.is_unspecified()
}

/// Validate a node or next-hop address
pub fn validate_unicast_address(addr: Ipv4Addr, context: &str) -> ValidationResult {
    if is_valid_unicast(addr) {
        Ok(())
    } else {
        Err(format!("{} must be a unicast address, got {}", context, addr))
    }
}

/// Validate the group half of an association
pub fn validate_multicast_group(group: Ipv4Addr, context: &str) -> ValidationResult {
    if group.is_multicast() {
        Ok(())
    } else {
        Err(format!(
            "{} must be a multicast group (224.0.0.0/4), got {}",
            context, group
        ))
    }
}

/// Validate the source half of an association
///
/// `0.0.0.0` is accepted and means "any source".
pub fn validate_association_source(source: Ipv4Addr, context: &str) -> ValidationResult {
    if source.is_multicast() || source.is_broadcast() {
        return Err(format!(
            "{} must be a unicast source or 0.0.0.0, got {}",
            context, source
        ));
    }
    Ok(())
}

/// Validate a timer interval
pub fn validate_interval(interval: Duration, context: &str) -> ValidationResult {
    if interval.is_zero() {
        return Err(format!("{} must be greater than zero", context));
    }
    Ok(())
}

/// Validate an interface name according to Linux kernel rules.
///
/// # Rules
/// - Must not be empty
/// - Must not exceed 15 characters (IFNAMSIZ - 1)
/// - Must contain only alphanumeric characters, dash, underscore, or dot
/// - Must not start with a digit, dash, or dot
pub fn validate_interface_name(name: &str) -> ValidationResult {
    if name.is_empty() {
        return Err("interface name cannot be empty".to_string());
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(format!(
            "interface name '{}' exceeds maximum length of {} characters",
            name, MAX_INTERFACE_NAME_LEN
        ));
    }

    if let Some((i, c)) = name
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.'))
    {
        return Err(format!(
            "interface name '{}' contains invalid character '{}' at position {}",
            name, c, i
        ));
    }

    match name.chars().next() {
        Some(first) if first.is_ascii_digit() => Err(format!(
            "interface name '{}' cannot start with a digit",
            name
        )),
        Some(first @ ('-' | '.')) => Err(format!(
            "interface name '{}' cannot start with '{}'",
            name, first
        )),
        _ => Ok(()),
    }
}
