//! Minimum spacing between screenshot calls

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Keeps consecutive captures at least `min_interval` apart.
///
/// Callers queue on the internal lock, so bursts are spread out in arrival
/// order rather than rejected.
#[derive(Debug)]
pub struct CaptureThrottle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl CaptureThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a capture is allowed and claim the slot.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last.lock().await;
        let now = Instant::now();
        let mut waited = Duration::ZERO;
        if let Some(previous) = *last {
            let allowed = previous + self.min_interval;
            if allowed > now {
                waited = allowed - now;
                log::debug!("Throttling screenshot for {}ms", waited.as_millis());
                sleep_until(allowed).await;
            }
        }
        *last = Some(Instant::now());
        waited
    }
}
