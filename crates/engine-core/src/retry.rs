use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Whether a failed operation is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Classified as fatal; bubbles up immediately.
    Fatal(E),
    /// Retryable, but the attempt budget ran out.
    AttemptsExceeded(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) | RetryError::AttemptsExceeded(e) => e,
        }
    }
}

/// Exponential backoff with a delay cap.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Preset for destination writes over HTTP: more attempts, longer cap,
    /// since a multi-hour run should ride out short outages.
    pub fn for_destination() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }

    pub async fn run<F, Fut, T, E, C>(&self, mut op: F, classify: C) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDisposition,
    {
        let mut attempt = 0usize;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if classify(&err) == RetryDisposition::Stop {
                        return Err(RetryError::Fatal(err));
                    }
                    attempt += 1;
                    if attempt >= self.max_attempts.max(1) {
                        return Err(RetryError::AttemptsExceeded(err));
                    }
                    sleep(self.delay_for(attempt)).await;
                }
            }
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u64 << attempt.min(6) as u32;
        let delay = self.base_delay.saturating_mul(factor as u32);
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fatal_errors_do_not_retry() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("schema mismatch") }
                },
                |_| RetryDisposition::Stop,
            )
            .await;
        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_budget_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = policy
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("timeout") }
                },
                |_| RetryDisposition::Retry,
            )
            .await;
        assert!(matches!(result, Err(RetryError::AttemptsExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn eventual_success_passes_through() {
        let calls = AtomicUsize::new(0);
        let result = RetryPolicy::default()
            .run(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 1 { Err("flaky") } else { Ok(n) }
                    }
                },
                |_| RetryDisposition::Retry,
            )
            .await;
        assert_eq!(result.unwrap(), 1);
    }
}
