//! Run-wide pacing for remote API calls.
//!
//! The remote service is rate limited; one [`Pacer`] owned by the
//! orchestrator is passed into the remote client and applied before every
//! request, regardless of request type. Cases run sequentially, so this is
//! the only suspension point in the engine.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }

    /// Block until at least `delay` has elapsed since the previous call.
    /// The first call never waits.
    pub async fn pace(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.delay {
                tokio::time::sleep(self.delay - since).await;
            }
        }
        *last = Some(Instant::now());
    }
}
