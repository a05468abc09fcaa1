use crate::client::ChargeStatus;
use std::time::{Duration, Instant};

/// Local model of the account's charge pool.
///
/// Charges regenerate linearly, one per `regen_interval`, up to `max`. The
/// stored `count` is the balance as of `last_observed_at`; anything later is
/// projected on demand.
#[derive(Clone, Debug)]
pub struct ChargeLedger {
    count: f64,
    max: f64,
    regen_interval: Duration,
    last_observed_at: Instant,
}

impl ChargeLedger {
    pub fn new(count: f64, max: f64, regen_interval: Duration, now: Instant) -> Self {
        let max = max.max(0.0);
        Self {
            count: count.clamp(0.0, max),
            max,
            regen_interval,
            last_observed_at: now,
        }
    }

    pub fn from_status(status: &ChargeStatus, now: Instant) -> Self {
        Self::new(status.count, status.max, status.cooldown, now)
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn regen_interval(&self) -> Duration {
        self.regen_interval
    }

    pub fn last_observed_at(&self) -> Instant {
        self.last_observed_at
    }

    /// Charges per second.
    pub fn regen_rate(&self) -> f64 {
        1.0 / self.regen_interval.as_secs_f64()
    }

    /// Server reported state. Replaces whatever was projected locally.
    pub fn observe(&mut self, count: f64, max: f64, now: Instant) {
        self.max = max.max(0.0);
        self.count = count.clamp(0.0, self.max);
        self.last_observed_at = now;
    }

    fn accrued(&self, elapsed: Duration) -> f64 {
        if self.regen_interval.is_zero() {
            return self.max;
        }

        (self.count + elapsed.as_secs_f64() * self.regen_rate()).min(self.max)
    }

    pub fn projected_balance(&self, now: Instant) -> f64 {
        self.accrued(now.saturating_duration_since(self.last_observed_at))
    }

    /// How long until `cost` charges are available, zero if they already are.
    ///
    /// A cost above `max` is never fully reachable; the result is then only
    /// meaningful for callers that cap the cost first.
    pub fn wait_time_for(&self, cost: f64, now: Instant) -> Duration {
        let balance = self.projected_balance(now);
        if balance >= cost || self.regen_interval.is_zero() {
            return Duration::ZERO;
        }

        // an interval long enough to overflow means the wait never ends
        Duration::try_from_secs_f64((cost - balance) * self.regen_interval.as_secs_f64())
            .unwrap_or(Duration::MAX)
    }

    /// Commit `elapsed` worth of regeneration, measured from `last_observed_at`.
    pub fn advance_time(&mut self, elapsed: Duration) {
        self.count = self.accrued(elapsed);
        if let Some(at) = self.last_observed_at.checked_add(elapsed) {
            self.last_observed_at = at;
        }
    }

    pub fn advance_to(&mut self, now: Instant) {
        self.advance_time(now.saturating_duration_since(self.last_observed_at));
    }

    pub fn debit(&mut self, cost: f64) {
        self.count = (self.count - cost).max(0.0);
    }
}
