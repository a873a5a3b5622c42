// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging macros for convenient logging

/// Log a message with critical severity
///
/// # Examples
/// ```ignore
/// log_critical!(logger, Facility::Transport, "Interface vanished");
/// ```
#[macro_export]
macro_rules! log_critical {
    ($logger:expr, $facility:expr, $msg:expr) => {
        $logger.critical($facility, $msg)
    };
}

/// Log a message with error severity
///
/// # Examples
/// ```ignore
/// log_error!(logger, Facility::Transport, "Failed to bind socket");
/// ```
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $facility:expr, $msg:expr) => {
        $logger.error($facility, $msg)
    };
}

/// Log a message with warning severity
///
/// # Examples
/// ```ignore
/// log_warning!(logger, Facility::Engine, "Malformed packet");
/// ```
#[macro_export]
macro_rules! log_warning {
    ($logger:expr, $facility:expr, $msg:expr) => {
        $logger.warning($facility, $msg)
    };
}

/// Log a message with notice severity
///
/// # Examples
/// ```ignore
/// log_notice!(logger, Facility::Arbitration, "Now forwarding");
/// ```
#[macro_export]
macro_rules! log_notice {
    ($logger:expr, $facility:expr, $msg:expr) => {
        $logger.notice($facility, $msg)
    };
}

/// Log a message with info severity
///
/// # Examples
/// ```ignore
/// log_info!(logger, Facility::Repository, "Neighbor added");
/// ```
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $facility:expr, $msg:expr) => {
        $logger.info($facility, $msg)
    };
}

/// Log a message with debug severity
///
/// # Examples
/// ```ignore
/// log_debug!(logger, Facility::Hello, "HELLO received");
/// ```
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $facility:expr, $msg:expr) => {
        $logger.debug($facility, $msg)
    };
}

/// Log a message with key-value pairs
///
/// # Examples
/// ```ignore
/// log_kv!(logger, Severity::Info, Facility::Hello, "HELLO sent",
///         "iface" => "wlan0", "seq" => "12");
/// ```
#[macro_export]
macro_rules! log_kv {
    ($logger:expr, $severity:expr, $facility:expr, $msg:expr, $($key:expr => $value:expr),+) => {{
        let kvs: &[(&str, &str)] = &[$(($key, $value)),+];
        $logger.log_kv($severity, $facility, $msg, kvs)
    }};
}
