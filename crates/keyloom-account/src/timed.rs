//! Idle-expiring secret holder.

use std::time::{Duration, SystemTime};

use crate::clock::Clock;

/// A secret held in memory with an idle timeout.
///
/// Every access refreshes the access time, so the secret expires only
/// after a full timeout of disuse.
#[derive(Debug, Clone)]
pub struct TimedSecret<K> {
    value: K,
    atime: SystemTime,
}

impl<K> TimedSecret<K> {
    /// Wrap a secret, stamping it with the current time.
    pub fn new(value: K, clock: &dyn Clock) -> Self {
        Self {
            value,
            atime: clock.now(),
        }
    }

    /// Access the secret, refreshing its access time.
    pub fn get(&mut self, clock: &dyn Clock) -> &K {
        self.atime = clock.now();
        &self.value
    }

    /// Read the secret without refreshing the access time.
    pub fn peek(&self) -> &K {
        &self.value
    }

    /// True if the secret has been idle strictly longer than `timeout`.
    pub fn expired(&self, clock: &dyn Clock, timeout: Duration) -> bool {
        match clock.now().duration_since(self.atime) {
            Ok(idle) => idle > timeout,
            // access time in the future: clock went backwards, keep it
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TIMEOUT: Duration = Duration::from_secs(3600);

    #[test]
    fn test_access_refreshes_expiry() {
        let clock = ManualClock::new();
        let mut secret = TimedSecret::new("phrase", &clock);

        clock.advance(Duration::from_secs(3000));
        assert!(!secret.expired(&clock, TIMEOUT));
        secret.get(&clock);

        clock.advance(Duration::from_secs(3000));
        assert!(!secret.expired(&clock, TIMEOUT));

        clock.advance(Duration::from_secs(601));
        assert!(secret.expired(&clock, TIMEOUT));
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let clock = ManualClock::new();
        let secret = TimedSecret::new("phrase", &clock);

        clock.advance(Duration::from_secs(3599));
        assert_eq!(*secret.peek(), "phrase");
        clock.advance(Duration::from_secs(2));
        assert!(secret.expired(&clock, TIMEOUT));
    }

    #[test]
    fn test_exact_timeout_is_not_yet_expired() {
        let clock = ManualClock::new();
        let secret = TimedSecret::new("phrase", &clock);

        clock.advance(TIMEOUT);
        assert!(!secret.expired(&clock, TIMEOUT));
        clock.advance(Duration::from_secs(1));
        assert!(secret.expired(&clock, TIMEOUT));
    }
}
