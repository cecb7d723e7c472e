use rand::Rng;
use std::time::Duration;

/// Exponential reconnect backoff with jitter. The attempt counter is
/// reset after every successful connect so a healthy stream always
/// restarts from the base delay.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    jitter: Duration,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub const fn new(base: Duration, max_delay: Duration, jitter: Duration) -> Self {
        Self {
            base,
            max_delay,
            jitter,
            attempt: 0,
        }
    }

    /// Next delay: `min(max, base * 2^attempt)` plus uniform jitter in
    /// `[-jitter, +jitter]`, floored at zero.
    pub fn next_delay(&mut self) -> Duration {
        let exp = 2_f64.powi(self.attempt.min(31) as i32);
        let mut secs = (self.base.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);

        let jitter = self.jitter.as_secs_f64();
        if jitter > 0.0 {
            secs = (secs + rand::thread_rng().gen_range(-jitter..=jitter)).max(0.0);
        }
        Duration::from_secs_f64(secs)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff_no_jitter() -> Backoff {
        Backoff::new(
            Duration::from_secs(2),
            Duration::from_secs(60),
            Duration::ZERO,
        )
    }

    #[test]
    fn delays_double_until_cap() {
        let mut backoff = backoff_no_jitter();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn reset_restarts_from_base() {
        let mut backoff = backoff_no_jitter();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut backoff = Backoff::new(
            Duration::from_secs(2),
            Duration::from_secs(60),
            Duration::from_millis(500),
        );
        for _ in 0..50 {
            backoff.reset();
            let delay = backoff.next_delay().as_secs_f64();
            assert!((1.5..=2.5).contains(&delay), "delay {delay} out of range");
        }
    }
}
