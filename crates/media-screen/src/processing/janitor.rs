//! Expiry sweep over the job store

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::JobStore;

/// Evicts job records older than a retention window, whatever their status
pub struct Janitor {
    store: Arc<JobStore>,
}

impl Janitor {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Remove every job created more than `retention` ago
    pub fn sweep(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let removed = self
            .store
            .remove_where(|job| job.is_expired(now, retention));

        if removed > 0 {
            tracing::info!(
                "Cleaned up {} expired jobs (retention {}s, {} remaining)",
                removed,
                retention.as_secs(),
                self.store.len()
            );
        }
        removed
    }
}
