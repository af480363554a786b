use std::time::Duration;

/// Doubles the retry delay after each consecutive failure, up to a maximum.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    current: Duration,
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            current: base,
            base,
            max,
        }
    }

    /// The delay before the next attempt.
    pub fn next(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(30));
        assert_eq!(b.next(), Duration::from_millis(100));
        assert_eq!(b.next(), Duration::from_millis(200));
        assert_eq!(b.next(), Duration::from_millis(400));
    }

    #[test]
    fn stops_increasing_at_max() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(2), Duration::from_millis(4));
        assert_eq!(b.next(), Duration::from_millis(2));
        assert_eq!(b.next(), Duration::from_millis(4));
        assert_eq!(b.next(), Duration::from_millis(4));
    }

    #[test]
    fn max_below_base() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(20), Duration::from_millis(10));
        assert_eq!(b.next(), Duration::from_millis(10));
        assert_eq!(b.next(), Duration::from_millis(10));
    }

    #[test]
    fn saturates() {
        let mut b = ExponentialBackoff::new(Duration::MAX, Duration::MAX);
        assert_eq!(b.next(), Duration::MAX);
        assert_eq!(b.next(), Duration::MAX);
    }

    #[test]
    fn reset() {
        let mut b = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60));
        assert_eq!(b.next(), Duration::from_secs(2));
        assert_eq!(b.next(), Duration::from_secs(4));
        b.reset();
        assert_eq!(b.next(), Duration::from_secs(2));
    }
}
