//! Bounded retry with linear backoff for contended filesystem operations.

use std::time::Duration;

/// Retry budget: at most `max_attempts` tries, sleeping
/// `backoff_base * attempt` between failures (linear backoff).
///
/// The sleep is injected by callers so tests run the full retry path with
/// zero real delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Zero-backoff policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay before retrying after the given 1-based attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }

    /// Run `op` up to the attempt budget, sleeping between failures via
    /// `sleep`. Returns the last error once the budget is exhausted.
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> std::io::Result<T>,
        mut sleep: impl FnMut(Duration),
    ) -> std::io::Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    tracing::debug!(
                        "retrying after attempt {attempt}/{}: {e}",
                        self.max_attempts
                    );
                    sleep(self.delay_after(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeds_without_sleeping() {
        let policy = RetryPolicy::immediate(5);
        let mut slept = 0;
        let out = policy.run(|| Ok(7), |_| slept += 1);
        assert_eq!(out.unwrap(), 7);
        assert_eq!(slept, 0);
    }

    #[test]
    fn test_retries_then_succeeds() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let mut calls = 0;
        let mut delays = Vec::new();
        let out = policy.run(
            || {
                calls += 1;
                if calls < 3 {
                    Err(std::io::Error::other("busy"))
                } else {
                    Ok(())
                }
            },
            |d| delays.push(d),
        );
        assert!(out.is_ok());
        assert_eq!(calls, 3);
        // Linear backoff: 10ms, then 20ms.
        assert_eq!(
            delays,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn test_exhausts_budget() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let out: std::io::Result<()> = policy.run(
            || {
                calls += 1;
                Err(std::io::Error::other("still busy"))
            },
            |_| {},
        );
        assert!(out.is_err());
        assert_eq!(calls, 3);
    }
}
