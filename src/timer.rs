//! Single-shot deferred task with restart semantics
//!
//! The pool never sleeps itself. Timers only record a deadline; the event loop
//! asks for the nearest deadline, waits that long, and hands the current time
//! back so due timers can fire.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SingleShotTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl SingleShotTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm the timer, discarding any pending countdown
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    /// Arm the timer only if it is not already counting down
    pub fn start_if_idle(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.start(now);
        }
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true exactly once when the deadline has passed, then disarms
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

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(250);

    #[test]
    fn test_fires_once_after_interval() {
        let mut timer = SingleShotTimer::new(INTERVAL);
        let t0 = Instant::now();
        timer.start(t0);

        assert!(!timer.fire_if_due(t0 + Duration::from_millis(100)));
        assert!(timer.fire_if_due(t0 + INTERVAL));
        // Single shot: disarmed afterwards
        assert!(!timer.is_active());
        assert!(!timer.fire_if_due(t0 + INTERVAL * 4));
    }

    #[test]
    fn test_restart_postpones_deadline() {
        let mut timer = SingleShotTimer::new(INTERVAL);
        let t0 = Instant::now();
        timer.start(t0);
        timer.start(t0 + Duration::from_millis(200));

        assert!(!timer.fire_if_due(t0 + Duration::from_millis(300)));
        assert!(timer.fire_if_due(t0 + Duration::from_millis(450)));
    }

    #[test]
    fn test_start_if_idle_keeps_first_deadline() {
        let mut timer = SingleShotTimer::new(INTERVAL);
        let t0 = Instant::now();
        timer.start_if_idle(t0);
        timer.start_if_idle(t0 + Duration::from_millis(200));

        assert_eq!(timer.deadline(), Some(t0 + INTERVAL));
    }

    #[test]
    fn test_stop_cancels() {
        let mut timer = SingleShotTimer::new(INTERVAL);
        let t0 = Instant::now();
        timer.start(t0);
        timer.stop();

        assert!(!timer.is_active());
        assert!(!timer.fire_if_due(t0 + INTERVAL * 2));
    }
}
