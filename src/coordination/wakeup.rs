use std::sync::Arc;
use tokio::sync::Notify;

/// Coalescing wake-up signal between tasks.
///
/// Requests made while nobody waits are kept as a single pending wake-up, so
/// a burst of requests costs the waiter one pass.
#[derive(Debug, Clone, Default)]
pub struct Wakeup {
    notify: Arc<Notify>,
}

impl Wakeup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_request_before_wait_is_kept() {
        let wake = Wakeup::new();
        wake.request();
        wake.request();

        tokio::time::timeout(Duration::from_secs(1), wake.wait())
            .await
            .expect("pending request should wake the waiter");

        // the burst collapsed into one permit
        assert!(tokio::time::timeout(Duration::from_millis(20), wake.wait())
            .await
            .is_err());
    }
}
