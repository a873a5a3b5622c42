// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Configuration file types and parsing for aimfd.
//!
//! JSON5 configuration format supporting:
//! - Protocol timers, willingness and tie-break policy
//! - Interface exclusion and MANET-facing output sets
//! - Local (group, source) associations and static unicast routes
//! - Log levels, globally and per facility
//! - Comments and trailing commas

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{Facility, Logger, Severity};
use crate::protocols::arbitration::TieBreak;
use crate::protocols::wire::TIME_CODE_MAX_SECS;
use crate::protocols::{
    AIMF_MAX_TTL, DEFAULT_ACTIVITY_WINDOW_MULTIPLIER, DEFAULT_ARBITRATION_INTERVAL,
    DEFAULT_HELLO_INTERVAL, DEFAULT_INITIAL_ARBITRATION_DELAY, DEFAULT_NEIGHBOR_HOLD_MULTIPLIER,
};
use crate::validation::{
    validate_association_source, validate_interface_name, validate_interval,
    validate_multicast_group, validate_unicast_address,
};
use crate::Willingness;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("willingness must be between 0 and 7, got {0}")]
    InvalidWillingness(u8),

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("invalid interface name '{name}': {reason}")]
    InvalidInterfaceName { name: String, reason: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("duplicate association ({group}, {origin})")]
    DuplicateAssociation { group: Ipv4Addr, origin: Ipv4Addr },

    #[error("interface '{0}' is both excluded and MANET-facing")]
    ExcludedManetInterface(String),

    #[error("interface '{0}' not found")]
    UnknownInterface(String),

    #[error("interface index {0} not found")]
    UnknownInterfaceIndex(u32),

    #[error("no usable (non-loopback) interface")]
    NoUsableInterface,

    #[error("unknown log level '{0}'")]
    InvalidLogLevel(String),

    #[error("unknown log facility '{0}'")]
    InvalidFacility(String),
}

/// Upper bound on the arbitration timers
const MAX_TIMER_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Protocol timers and policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Period between HELLO emissions
    pub hello_interval_ms: u64,
    /// Base period between arbitration passes
    pub arbitration_interval_ms: u64,
    /// Delay from Start() to the first arbitration pass
    pub initial_arbitration_delay_ms: u64,
    pub willingness: Willingness,
    /// Advertised validity = multiplier x hello interval
    pub neighbor_hold_multiplier: u32,
    /// Liveness base window = multiplier x hello interval
    pub activity_window_multiplier: u32,
    pub message_ttl: u8,
    pub tie_break: TieBreak,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            hello_interval_ms: DEFAULT_HELLO_INTERVAL.as_millis() as u64,
            arbitration_interval_ms: DEFAULT_ARBITRATION_INTERVAL.as_millis() as u64,
            initial_arbitration_delay_ms: DEFAULT_INITIAL_ARBITRATION_DELAY.as_millis() as u64,
            willingness: Willingness::DEFAULT,
            neighbor_hold_multiplier: DEFAULT_NEIGHBOR_HOLD_MULTIPLIER,
            activity_window_multiplier: DEFAULT_ACTIVITY_WINDOW_MULTIPLIER,
            message_ttl: AIMF_MAX_TTL,
            tie_break: TieBreak::Forward,
        }
    }
}

impl ProtocolConfig {
    pub fn hello_interval(&self) -> Duration {
        Duration::from_millis(self.hello_interval_ms)
    }

    pub fn arbitration_interval(&self) -> Duration {
        Duration::from_millis(self.arbitration_interval_ms)
    }

    pub fn initial_arbitration_delay(&self) -> Duration {
        Duration::from_millis(self.initial_arbitration_delay_ms)
    }

    /// Validity advertised in every HELLO
    ///
    /// Saturates on overflow; `validate` rejects such configurations.
    pub fn neighbor_hold_time(&self) -> Duration {
        self.scaled_hello_interval(self.neighbor_hold_multiplier)
            .unwrap_or(Duration::MAX)
    }

    /// Base window of the group liveness heuristic
    pub fn activity_base_window(&self) -> Duration {
        self.scaled_hello_interval(self.activity_window_multiplier)
            .unwrap_or(Duration::MAX)
    }

    fn scaled_hello_interval(&self, multiplier: u32) -> Option<Duration> {
        self.hello_interval().checked_mul(multiplier)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: String| ConfigError::InvalidValue {
            field: field.to_string(),
            reason,
        };

        validate_interval(self.hello_interval(), "hello_interval_ms")
            .map_err(|r| invalid("hello_interval_ms", r))?;
        validate_interval(self.arbitration_interval(), "arbitration_interval_ms")
            .map_err(|r| invalid("arbitration_interval_ms", r))?;

        if self.neighbor_hold_multiplier == 0 {
            return Err(invalid(
                "neighbor_hold_multiplier",
                "must be at least 1".to_string(),
            ));
        }
        if self.activity_window_multiplier == 0 {
            return Err(invalid(
                "activity_window_multiplier",
                "must be at least 1".to_string(),
            ));
        }
        for (field, interval) in [
            ("arbitration_interval_ms", self.arbitration_interval()),
            ("initial_arbitration_delay_ms", self.initial_arbitration_delay()),
        ] {
            if interval > MAX_TIMER_INTERVAL {
                return Err(invalid(
                    field,
                    format!("{:?} exceeds the {:?} limit", interval, MAX_TIMER_INTERVAL),
                ));
            }
        }

        // every window derived from the hello interval must fit the time code
        for (field, multiplier) in [
            ("hello_interval_ms", 1),
            ("neighbor_hold_multiplier", self.neighbor_hold_multiplier),
            ("activity_window_multiplier", self.activity_window_multiplier),
        ] {
            match self.scaled_hello_interval(multiplier) {
                Some(window) if window.as_secs_f64() <= TIME_CODE_MAX_SECS => {}
                Some(window) => {
                    return Err(invalid(
                        field,
                        format!(
                            "{:?} exceeds the largest encodable interval ({}s)",
                            window, TIME_CODE_MAX_SECS
                        ),
                    ))
                }
                None => {
                    return Err(invalid(
                        field,
                        "hello interval times multiplier overflows".to_string(),
                    ))
                }
            }
        }
        if self.message_ttl == 0 {
            return Err(invalid(
                "message_ttl",
                "TTL 0 messages are dropped by every receiver".to_string(),
            ));
        }
        Ok(())
    }
}

/// Interface participation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct InterfacesConfig {
    /// Interfaces that never run the protocol
    pub exclude: Vec<String>,
    /// Forwarding output interfaces; empty means every participating interface
    pub manet: Vec<String>,
}

/// A local (group, source) interest
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AssociationConfig {
    pub group: Ipv4Addr,
    #[serde(default = "unspecified")]
    pub source: Ipv4Addr,
}

fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

/// A static unicast route consulted by arbitration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub destination: Ipv4Addr,
    #[serde(default = "host_prefix")]
    pub prefix_len: u8,
    /// Gateway; absent for on-link destinations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<Ipv4Addr>,
    pub interface: String,
    #[serde(default = "default_metric")]
    pub metric: u32,
}

fn host_prefix() -> u8 {
    32
}

fn default_metric() -> u32 {
    1
}

/// Log levels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Per-facility overrides, e.g. `{ hello: "debug" }`
    pub facilities: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            facilities: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve().map(|_| ())
    }

    fn resolve(&self) -> Result<(Severity, Vec<(Facility, Severity)>), ConfigError> {
        let global = Severity::from_name(&self.level)
            .ok_or_else(|| ConfigError::InvalidLogLevel(self.level.clone()))?;
        let mut overrides = Vec::new();
        for (facility, level) in &self.facilities {
            let facility = Facility::from_name(facility)
                .ok_or_else(|| ConfigError::InvalidFacility(facility.clone()))?;
            let level = Severity::from_name(level)
                .ok_or_else(|| ConfigError::InvalidLogLevel(level.clone()))?;
            overrides.push((facility, level));
        }
        Ok((global, overrides))
    }

    /// Apply the configured levels to a logger
    pub fn apply(&self, logger: &Logger) -> Result<(), ConfigError> {
        let (global, overrides) = self.resolve()?;
        logger.set_global_level(global);
        for (facility, level) in overrides {
            logger.set_facility_level(facility, level);
        }
        Ok(())
    }
}

/// Startup configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Node identifier used in logs; defaults to the main address as u32
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<u32>,
    pub protocol: ProtocolConfig,
    pub interfaces: InterfacesConfig,
    pub associations: Vec<AssociationConfig>,
    pub routes: Vec<RouteConfig>,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration (JSON is valid JSON5)
    pub fn to_json5(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json5())
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.protocol.validate()?;
        self.logging.validate()?;

        for name in self.interfaces.exclude.iter().chain(&self.interfaces.manet) {
            validate_interface_name(name).map_err(|reason| ConfigError::InvalidInterfaceName {
                name: name.clone(),
                reason,
            })?;
        }
        if let Some(both) = self
            .interfaces
            .manet
            .iter()
            .find(|name| self.interfaces.exclude.contains(name))
        {
            return Err(ConfigError::ExcludedManetInterface(both.clone()));
        }

        let mut seen = HashSet::new();
        for (idx, assoc) in self.associations.iter().enumerate() {
            validate_multicast_group(assoc.group, &format!("association {} group", idx))
                .map_err(ConfigError::InvalidAddress)?;
            validate_association_source(assoc.source, &format!("association {} source", idx))
                .map_err(ConfigError::InvalidAddress)?;
            if !seen.insert((assoc.group, assoc.source)) {
                return Err(ConfigError::DuplicateAssociation {
                    group: assoc.group,
                    origin: assoc.source,
                });
            }
        }

        for (idx, route) in self.routes.iter().enumerate() {
            validate_interface_name(&route.interface).map_err(|reason| {
                ConfigError::InvalidInterfaceName {
                    name: route.interface.clone(),
                    reason,
                }
            })?;
            if route.prefix_len > 32 {
                return Err(ConfigError::InvalidValue {
                    field: format!("route {} prefix_len", idx),
                    reason: format!("{} is longer than 32", route.prefix_len),
                });
            }
            if let Some(next_hop) = route.next_hop {
                validate_unicast_address(next_hop, &format!("route {} next_hop", idx))
                    .map_err(ConfigError::InvalidAddress)?;
            }
        }

        Ok(())
    }

    /// All interface names the configuration refers to
    pub fn get_interfaces(&self) -> Vec<String> {
        let mut interfaces: Vec<String> = self
            .interfaces
            .exclude
            .iter()
            .chain(&self.interfaces.manet)
            .chain(self.routes.iter().map(|r| &r.interface))
            .cloned()
            .collect();
        interfaces.sort();
        interfaces.dedup();
        interfaces
    }
}
