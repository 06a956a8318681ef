use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry with a fixed pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Pause between two attempts, in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
}

/// Result of running an operation under a retry policy
#[derive(Debug)]
pub struct Attempts<T> {
    pub result: Result<T>,
    /// Attempts actually made
    pub count: u32,
}

impl RetryPolicy {
    /// `max_attempts` attempts separated by `delay`
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// `max_attempts` attempts back to back
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// The closure receives the 1-based attempt number. The thread sleeps for
    /// the configured delay between attempts (never after the last one), so
    /// call this from a blocking context.
    pub fn run<T, F>(&self, mut operation: F) -> Attempts<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt) {
                Ok(value) => {
                    return Attempts {
                        result: Ok(value),
                        count: attempt,
                    };
                }
                Err(err) if attempt >= max_attempts => {
                    return Attempts {
                        result: Err(err),
                        count: attempt,
                    };
                }
                Err(err) => {
                    tracing::debug!(attempt, max_attempts, error = %err, "attempt failed, retrying");
                    if self.delay_ms > 0 {
                        std::thread::sleep(self.delay());
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_stops_on_first_success() {
        let mut calls = 0;
        let attempts = RetryPolicy::immediate(3).run(|_| {
            calls += 1;
            Ok::<_, anyhow::Error>(7)
        });

        assert_eq!(attempts.result.unwrap(), 7);
        assert_eq!(attempts.count, 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_exhausts_attempts_and_keeps_last_error() {
        let attempts = RetryPolicy::immediate(3).run(|attempt| -> Result<()> {
            anyhow::bail!("failure {}", attempt)
        });

        assert_eq!(attempts.count, 3);
        assert_eq!(attempts.result.unwrap_err().to_string(), "failure 3");
    }

    #[test]
    fn test_succeeds_on_last_attempt() {
        let attempts = RetryPolicy::immediate(3).run(|attempt| {
            if attempt < 3 {
                anyhow::bail!("throttled");
            }
            Ok(attempt)
        });

        assert_eq!(attempts.result.unwrap(), 3);
        assert_eq!(attempts.count, 3);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let attempts = RetryPolicy::immediate(0).run(|_| Ok::<_, anyhow::Error>(()));
        assert_eq!(attempts.count, 1);
    }

    #[test]
    fn test_fixed_delay_between_attempts_only() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(30));
        let start = Instant::now();

        let attempts = policy.run(|_| -> Result<()> { anyhow::bail!("down") });

        let elapsed = start.elapsed();
        assert_eq!(attempts.count, 3);
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(90 + 500));
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 5\ndelay_ms: 250").unwrap();
        assert_eq!(policy, RetryPolicy::fixed(5, Duration::from_millis(250)));

        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 2").unwrap();
        assert_eq!(policy, RetryPolicy::immediate(2));
    }
}
