//! Timers owned by the GAP manager
//!
//! The GAP manager schedules its timeouts through [`Timers`] and expects the
//! event loop to hand every expiry back through `GapManager::on_timer`.

use super::types::AdvertisingHandle;
use std::time::Duration;

/// Identifies a timeout scheduled by the GAP manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// End of a host timed advertising session
    Advertising(AdvertisingHandle),
    /// End of a host timed scan session
    Scan,
    /// Periodic private address rotation
    AddressRotation,
}

/// Timer service injected into the GAP manager.
pub trait Timers {
    /// Arms a one-shot timer, replacing any timer with the same id.
    fn schedule(&mut self, id: TimerId, delay: Duration);

    /// Arms a periodic timer, replacing any timer with the same id.
    fn schedule_periodic(&mut self, id: TimerId, period: Duration);

    /// Disarms a timer. Cancelling an idle timer is a no-op.
    fn cancel(&mut self, id: TimerId);

    fn is_scheduled(&self, id: TimerId) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    id: TimerId,
    deadline: Duration,
    period: Option<Duration>,
}

/// Deterministic timers driven by explicit calls to [`VirtualTimers::advance`].
#[derive(Debug, Default)]
pub struct VirtualTimers {
    now: Duration,
    armed: Vec<Armed>,
}

impl VirtualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Moves time forward and returns the expired timers in deadline order.
    /// Periodic timers are re-armed and can expire several times.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerId> {
        let target = self.now + by;
        let mut expired = Vec::new();
        loop {
            let next = self
                .armed
                .iter()
                .enumerate()
                .filter(|(_, timer)| timer.deadline <= target)
                .min_by_key(|(_, timer)| timer.deadline)
                .map(|(index, _)| index);
            let Some(index) = next else {
                break;
            };
            let timer = self.armed[index];
            self.now = timer.deadline;
            expired.push(timer.id);
            match timer.period {
                Some(period) if !period.is_zero() => self.armed[index].deadline += period,
                _ => {
                    self.armed.remove(index);
                }
            }
        }
        self.now = target;
        expired
    }

    fn arm(&mut self, id: TimerId, delay: Duration, period: Option<Duration>) {
        self.cancel(id);
        self.armed.push(Armed {
            id,
            deadline: self.now + delay,
            period,
        });
    }
}

impl Timers for VirtualTimers {
    fn schedule(&mut self, id: TimerId, delay: Duration) {
        self.arm(id, delay, None);
    }

    fn schedule_periodic(&mut self, id: TimerId, period: Duration) {
        self.arm(id, period, Some(period));
    }

    fn cancel(&mut self, id: TimerId) {
        self.armed.retain(|timer| timer.id != id);
    }

    fn is_scheduled(&self, id: TimerId) -> bool {
        self.armed.iter().any(|timer| timer.id == id)
    }
}
