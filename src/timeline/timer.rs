//! Deadline-based timers serviced by the controller tick.
//!
//! Both timers read `tokio::time::Instant`, so tests can drive them with
//! `tokio::time::pause()` / `advance()`.

use std::time::Duration;
use tokio::time::Instant;

/// Trailing-edge debounce: every `arm` pushes the deadline out again.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restart the countdown from now.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true exactly once when the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Fixed-period timer. A zero period disables it.
#[derive(Debug, Clone)]
pub struct RefreshTimer {
    period: Duration,
    next_due: Option<Instant>,
}

impl RefreshTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    pub fn start(&mut self) {
        if self.period.is_zero() {
            tracing::debug!("Periodic refresh disabled");
            return;
        }
        self.next_due = Some(Instant::now() + self.period);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Returns true when a period has elapsed and schedules the next one.
    /// Missed periods collapse into a single firing.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                let mut next = due + self.period;
                if next <= now {
                    next = now + self.period;
                }
                self.next_due = Some(next);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_debounce_fires_after_delay() {
        let mut debounce = Debouncer::new(Duration::from_secs(3));
        debounce.arm();
        tokio::time::advance(Duration::from_millis(2999)).await;
        assert!(!debounce.fire_if_due(Instant::now()));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(debounce.fire_if_due(Instant::now()));
        assert!(!debounce.fire_if_due(Instant::now()), "fires once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_rearm_resets() {
        let mut debounce = Debouncer::new(Duration::from_secs(3));
        debounce.arm();
        tokio::time::advance(Duration::from_secs(2)).await;
        debounce.arm();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!debounce.fire_if_due(Instant::now()));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(debounce.fire_if_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_cancel() {
        let mut debounce = Debouncer::new(Duration::from_secs(3));
        debounce.arm();
        debounce.cancel();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!debounce.fire_if_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_timer_periodic() {
        let mut timer = RefreshTimer::new(Duration::from_secs(300));
        timer.start();
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!timer.fire_if_due(Instant::now()));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(timer.fire_if_due(Instant::now()));
        assert!(!timer.fire_if_due(Instant::now()));
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(timer.fire_if_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_timer_collapses_missed_periods() {
        let mut timer = RefreshTimer::new(Duration::from_secs(10));
        timer.start();
        tokio::time::advance(Duration::from_secs(35)).await;
        assert!(timer.fire_if_due(Instant::now()));
        assert!(!timer.fire_if_due(Instant::now()));
    }

    #[test]
    fn test_refresh_timer_zero_period_disabled() {
        let mut timer = RefreshTimer::new(Duration::ZERO);
        timer.start();
        assert!(!timer.is_running());
    }
}
