//! Exponential back-off with jitter for transient infrastructure errors.

use std::time::Duration;

use rand::Rng;

/// Fraction by which each delay is randomised in either direction.
const JITTER: f64 = 0.2;

/// Exponential back-off: base delay doubling up to a cap, ±20% jitter.
///
/// Both the BLE scanner and the MQTT publisher recover from transient errors
/// with the same policy (1 s base, 30 s cap, unbounded attempts). The jitter
/// keeps a fleet of daemons from hammering a broker in lockstep after an
/// outage.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    /// Create a back-off policy with the given base delay and cap.
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: base,
            attempts: 0,
        }
    }

    /// The standard policy used across the daemon: 1 s doubling to 30 s.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Return the next jittered delay and advance the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        self.attempts += 1;

        let factor = rand::thread_rng().gen_range(1.0 - JITTER..=1.0 + JITTER);
        delay.mul_f64(factor)
    }

    /// Return to the base delay after a successful recovery.
    pub fn reset(&mut self) {
        self.current = self.base;
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within_jitter(actual: Duration, nominal: Duration) -> bool {
        let lo = nominal.mul_f64(1.0 - JITTER);
        let hi = nominal.mul_f64(1.0 + JITTER);
        actual >= lo && actual <= hi
    }

    #[test]
    fn should_start_at_base_delay() {
        let mut backoff = Backoff::standard();
        let first = backoff.next_delay();
        assert!(within_jitter(first, Duration::from_secs(1)));
    }

    #[test]
    fn should_double_until_cap() {
        let mut backoff = Backoff::standard();
        let mut nominal = Duration::from_secs(1);
        for _ in 0..8 {
            let delay = backoff.next_delay();
            assert!(
                within_jitter(delay, nominal),
                "delay {delay:?} not within jitter of {nominal:?}"
            );
            nominal = (nominal * 2).min(Duration::from_secs(30));
        }
        // Past the doubling range every delay stays at the cap.
        let capped = backoff.next_delay();
        assert!(within_jitter(capped, Duration::from_secs(30)));
    }

    #[test]
    fn should_count_attempts() {
        let mut backoff = Backoff::standard();
        assert_eq!(backoff.attempts(), 0);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);
    }

    #[test]
    fn should_return_to_base_on_reset() {
        let mut backoff = Backoff::standard();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        let delay = backoff.next_delay();
        assert!(within_jitter(delay, Duration::from_secs(1)));
    }
}
