use std::time::Duration;

pub const DEFAULT_RETRY_DURATION: Duration = Duration::from_secs(1);

/// Delayed-retry state machine for rebuilding the native session.
///
/// A degraded monitor or a topology change arms the controller; once the
/// retry duration has elapsed since arming, exactly one reinitialize is
/// due. If the monitors are still degraded afterwards, the next tick arms
/// it again, giving an unbounded retry loop at a bounded rate.
#[derive(Clone, Debug)]
pub struct ReinitializationController {
    retry_duration: Duration,
    pending: bool,
    elapsed: Duration,
}

impl ReinitializationController {
    pub fn new(retry_duration: Duration) -> Self {
        Self {
            retry_duration,
            pending: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn retry_duration(&self) -> Duration {
        self.retry_duration
    }

    pub fn is_armed(&self) -> bool {
        self.pending
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Advance one scheduling tick of length `dt`.
    ///
    /// Returns `true` when the caller must reinitialize now; the controller
    /// is disarmed at that point. Arming never restarts a running timer.
    pub fn tick(&mut self, needs_reinitialize: bool, dt: Duration) -> bool {
        if !self.pending {
            if needs_reinitialize {
                self.pending = true;
                self.elapsed = Duration::ZERO;
            }
            return false;
        }

        self.elapsed = self.elapsed.saturating_add(dt);
        if self.elapsed >= self.retry_duration {
            self.reset();
            return true;
        }
        false
    }

    /// Forget any pending request. Called whenever a reinitialize
    /// completes, whatever triggered it.
    pub fn reset(&mut self) {
        self.pending = false;
        self.elapsed = Duration::ZERO;
    }
}

impl Default for ReinitializationController {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DURATION)
    }
}
