use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::HttpError;

/// Exponential backoff schedule for transient failures.
///
/// The number of delays is the number of retries after the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// `attempts` retries with no sleeping, for tests.
    pub fn immediate(attempts: usize) -> Self {
        Self {
            delays: vec![Duration::ZERO; attempts],
        }
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }

    /// Runs `f`, retrying transient failures along the schedule.
    ///
    /// Returns the first success, the first permanent error, or the last
    /// transient error once the schedule is exhausted.
    pub fn run<T, F>(&self, mut f: F) -> Result<T, HttpError>
    where
        F: FnMut() -> Result<T, HttpError>,
    {
        let mut last_error = match f() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        for (attempt, &delay) in self.delays.iter().enumerate() {
            tracing::debug!(attempt = attempt + 1, ?delay, error = %last_error, "retrying");
            thread::sleep(delay);

            match f() {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }
}

impl Default for RetryPolicy {
    /// 1s, 2s, 4s.
    fn default() -> Self {
        Self::new([1, 2, 4].into_iter().map(Duration::from_secs).collect())
    }
}

/// Enforces a fixed minimum gap between consecutive calls.
///
/// Safe to share between sources; callers queue on the inner lock.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: Mutex::new(None),
        }
    }

    /// Sleeps until `delay` has passed since the previous call.
    pub fn wait(&self) {
        let mut last_call = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                thread::sleep(self.delay - elapsed);
            }
        }
        *last_call = Some(Instant::now());
    }
}
