use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{ sleep_until, Instant };

/// Enforces a minimum interval between consecutive requests to one upstream.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until the next request slot is free and claim it.
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        // Holding the lock while sleeping queues concurrent callers in order.
        let mut next_slot = self.next_slot.lock().await;
        if let Some(at) = *next_slot {
            if at > Instant::now() {
                sleep_until(at).await;
            }
        }
        *next_slot = Some(Instant::now() + self.min_interval);
    }
}
