use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);

    fn now_millis(&self) -> u64 {
        self.now().timestamp_millis().max(0) as u64
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_at_millis(millis: i64) -> Self {
        Self::new(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
            *now = now.checked_add_signed(delta).unwrap_or(*now);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at_millis(1_700_000_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicStamp {
    last: u64,
}

impl MonotonicStamp {
    pub fn next(&mut self, clock: &dyn Clock) -> u64 {
        self.last = clock.now_millis().max(self.last + 1);
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_on_sleep() {
        let clock = ManualClock::starting_at_millis(1_000);
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now_millis(), 1_250);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now_millis(), 2_250);
    }

    #[test]
    fn stamps_increase_on_a_frozen_clock() {
        let clock = ManualClock::starting_at_millis(5_000);
        let mut stamps = MonotonicStamp::default();
        assert_eq!(stamps.next(&clock), 5_000);
        assert_eq!(stamps.next(&clock), 5_001);
        clock.advance(Duration::from_millis(10));
        assert_eq!(stamps.next(&clock), 5_010);
    }
}
