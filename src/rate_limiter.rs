use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Keeps outbound requests at least `delay` apart. The lock is held while
/// sleeping so concurrent callers queue up behind each other.
pub struct RateLimiter {
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> RateLimiter {
        RateLimiter {
            delay,
            last_request: Mutex::new(None),
        }
    }

    /// Waits out the remainder of the interval and returns the instant that
    /// was recorded as the new "last request".
    pub async fn throttle(&self) -> Instant {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                let wait = self.delay - elapsed;
                log::debug!("rate limiting, sleeping {}ms", wait.as_millis());
                sleep(wait).await;
            }
        }
        let now = Instant::now();
        *last = Some(now);
        now
    }
}
