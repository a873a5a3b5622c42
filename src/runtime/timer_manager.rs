// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Protocol timer management.
//!
//! Timer requests arrive on a channel from [`TokioScheduler`](super::TokioScheduler)
//! and wait in a binary heap; the earliest pending timer sets the sleep
//! duration. Expired timers are handed back to the main loop as
//! [`RuntimeEvent::Timer`] in non-decreasing time order, ties in arrival order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

use super::RuntimeEvent;
use crate::logging::{Facility, Logger};
use crate::protocols::{TimerRequest, TimerType};

/// Longest sleep while the heap is empty
const IDLE_SLEEP: Duration = Duration::from_secs(3600);

/// Protocol timer management
pub struct ProtocolTimerManager {
    /// Pending timers, earliest first
    timers: BinaryHeap<Reverse<ScheduledTimer>>,
    /// Channel to receive new timer requests
    timer_rx: mpsc::UnboundedReceiver<TimerRequest>,
    /// Channel to send timer expiry events
    event_tx: mpsc::Sender<RuntimeEvent>,
    /// Instant that `TimerRequest::fire_at` offsets are measured from
    epoch: Instant,
    next_sequence: u64,
    logger: Logger,
}

/// A scheduled timer with its fire time and type
#[derive(Debug, Clone)]
struct ScheduledTimer {
    fire_at: Instant,
    sequence: u64,
    timer_type: TimerType,
}

impl PartialEq for ScheduledTimer {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.sequence == other.sequence
    }
}

impl Eq for ScheduledTimer {}

impl PartialOrd for ScheduledTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl ProtocolTimerManager {
    pub fn new(
        timer_rx: mpsc::UnboundedReceiver<TimerRequest>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        epoch: Instant,
        logger: Logger,
    ) -> Self {
        Self {
            timers: BinaryHeap::new(),
            timer_rx,
            event_tx,
            epoch,
            next_sequence: 0,
            logger,
        }
    }

    fn schedule(&mut self, request: TimerRequest) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.timers.push(Reverse(ScheduledTimer {
            fire_at: self.epoch + request.fire_at,
            sequence,
            timer_type: request.timer_type,
        }));

        log_debug!(
            self.logger,
            Facility::Timer,
            &format!(
                "Scheduled {} timer, {} pending",
                request.timer_type.name(),
                self.timers.len()
            )
        );
    }

    fn pop_due(&mut self, now: Instant) -> Option<ScheduledTimer> {
        let due = self
            .timers
            .peek()
            .map_or(false, |Reverse(next)| next.fire_at <= now);
        if due {
            self.timers.pop().map(|t| t.0)
        } else {
            None
        }
    }

    /// Run the timer management loop until either channel closes
    pub async fn run(mut self) {
        log_info!(self.logger, Facility::Timer, "Protocol timer manager started");

        loop {
            let deadline = match self.timers.peek() {
                Some(Reverse(next)) => next.fire_at,
                None => Instant::now() + IDLE_SLEEP,
            };

            tokio::select! {
                _ = sleep_until(deadline) => {
                    let now = Instant::now();
                    while let Some(timer) = self.pop_due(now) {
                        log_debug!(
                            self.logger,
                            Facility::Timer,
                            &format!("Timer expired: {:?}", timer.timer_type)
                        );
                        if self.event_tx.send(RuntimeEvent::Timer(timer.timer_type)).await.is_err() {
                            log_warning!(
                                self.logger,
                                Facility::Timer,
                                "Event channel closed, timer manager exiting"
                            );
                            return;
                        }
                    }
                }

                request = self.timer_rx.recv() => {
                    match request {
                        Some(request) => self.schedule(request),
                        None => {
                            log_info!(
                                self.logger,
                                Facility::Timer,
                                "Timer request channel closed, timer manager exiting"
                            );
                            return;
                        }
                    }
                }
            }
        }
    }
}
