// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Wall-clock [`Scheduler`] backed by the timer manager task

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::engine::Scheduler;
use crate::protocols::{TimerRequest, TimerType};
use crate::Timestamp;

/// Reports time since `epoch` and forwards timer requests to
/// [`ProtocolTimerManager`](super::ProtocolTimerManager)
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    epoch: Instant,
    timer_tx: mpsc::UnboundedSender<TimerRequest>,
}

impl TokioScheduler {
    pub fn new(epoch: Instant, timer_tx: mpsc::UnboundedSender<TimerRequest>) -> Self {
        Self { epoch, timer_tx }
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Timestamp {
        self.epoch.elapsed()
    }

    fn schedule_at(&mut self, at: Timestamp, timer: TimerType) {
        // only fails once the manager has exited during shutdown
        let _ = self.timer_tx.send(TimerRequest::new(timer, at));
    }
}
