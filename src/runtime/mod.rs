// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Daemon runtime: drives one engine on tokio
//!
//! The engine itself stays single-threaded. Background tasks (the timer
//! manager and one receiver per socket) only produce [`RuntimeEvent`]s; the
//! main loop owns the engine and applies events one at a time.

pub mod inventory;
mod scheduler;
mod timer_manager;
mod udp;

pub use scheduler::TokioScheduler;
pub use timer_manager::ProtocolTimerManager;
pub use udp::UdpTransport;

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::config::Config;
use crate::engine::{EngineNotification, EventSubscriptionManager, ProtocolEngine};
use crate::logging::{Facility, Logger, Severity};
use crate::protocols::TimerType;

/// Queue depth between background tasks and the main loop
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Work item for the main loop
#[derive(Debug)]
pub enum RuntimeEvent {
    Timer(TimerType),
    Datagram {
        interface: u32,
        sender: Ipv4Addr,
        payload: Vec<u8>,
    },
}

/// Log forwarding decisions and table changes published by the engine
async fn log_notifications(
    mut rx: broadcast::Receiver<EngineNotification>,
    logger: Logger,
) {
    loop {
        match rx.recv().await {
            Ok(
                notification @ (EngineNotification::ForwardingChanged { .. }
                | EngineNotification::TableSizeChanged { .. }),
            ) => {
                let json = serde_json::to_string(&notification).unwrap_or_default();
                log_kv!(
                    logger,
                    Severity::Info,
                    Facility::Engine,
                    "Engine event",
                    "event" => &json
                );
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log_kv!(
                    logger,
                    Severity::Warning,
                    Facility::Engine,
                    "Diagnostics subscriber lagged",
                    "skipped" => &skipped.to_string()
                );
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Run the protocol until Ctrl-C
pub async fn run(config: Config, logger: Logger) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    config
        .logging
        .apply(&logger)
        .context("Invalid logging configuration")?;

    let inventory = inventory::discover_interfaces();
    let ctx = inventory::build_context(&config, inventory)
        .context("Failed to resolve interfaces")?;
    let routes = inventory::build_routes(&config, &ctx).context("Failed to resolve routes")?;

    log_kv!(
        logger,
        Severity::Info,
        Facility::Config,
        "Node context resolved",
        "node" => &ctx.log_label(),
        "manet" => &format!("{:?}", ctx.manet_interfaces())
    );

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let epoch = Instant::now();

    let timer_manager =
        ProtocolTimerManager::new(timer_rx, event_tx.clone(), epoch, logger.clone());
    let timer_task = tokio::spawn(timer_manager.run());

    let scheduler = TokioScheduler::new(epoch, timer_tx);
    let transport = UdpTransport::new(event_tx, logger.clone());
    let mut engine = ProtocolEngine::new(
        ctx,
        config.protocol.clone(),
        scheduler,
        transport,
        routes,
        logger.clone(),
    )?;

    let events = EventSubscriptionManager::default();
    let diagnostics_task = tokio::spawn(log_notifications(events.subscribe(), logger.clone()));
    engine.add_observer(Box::new(events));

    engine.start().context("Failed to start AIMF")?;
    for association in &config.associations {
        engine
            .add_local_association(association.group, association.source)
            .with_context(|| {
                format!(
                    "Failed to add association ({}, {})",
                    association.group, association.source
                )
            })?;
    }

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(RuntimeEvent::Timer(timer)) => engine.handle_timer(timer),
                Some(RuntimeEvent::Datagram { interface, sender, payload }) => {
                    engine.receive(interface, &payload, sender)
                }
                None => {
                    log_warning!(logger, Facility::Engine, "Event channel closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                log_notice!(logger, Facility::Engine, "Interrupted, shutting down");
                break;
            }
        }
    }

    log_debug!(
        logger,
        Facility::Forwarding,
        &format!("Final forwarding table:\n{}", engine.forwarding_table())
    );
    engine.stop();

    let stats = serde_json::to_string(&engine.stats()).unwrap_or_default();
    log_kv!(
        logger,
        Severity::Info,
        Facility::Engine,
        "Engine statistics",
        "stats" => &stats
    );

    timer_task.abort();
    diagnostics_task.abort();
    Ok(())
}
