use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps how many probes of a batch hold a socket at the same time.
pub struct InFlight {
    sem: Arc<Semaphore>,
}

impl Clone for InFlight {
    fn clone(&self) -> Self { InFlight { sem: self.sem.clone() } }
}

impl InFlight {
    /// `max` is clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(max: usize) -> Self {
        InFlight { sem: Arc::new(Semaphore::new(max.clamp(1, Semaphore::MAX_PERMITS))) }
    }

    /// Wait for a slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.sem.clone().acquire_owned().await.ok()
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
