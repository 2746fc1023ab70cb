//! Archives with a download in flight.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::FetchError;

/// Set of archives currently being fetched from.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct DownloadTracker {
    active: Arc<Mutex<BTreeSet<String>>>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        // The set stays consistent even if a holder panicked
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `archive` until the returned guard is dropped.
    pub fn begin(&self, archive: &str) -> Result<DownloadGuard, FetchError> {
        if !self.lock().insert(archive.to_string()) {
            return Err(FetchError::Busy {
                archive: archive.to_string(),
            });
        }
        tracing::trace!(archive, "download started");
        Ok(DownloadGuard {
            tracker: self.clone(),
            archive: archive.to_string(),
        })
    }

    pub fn is_busy(&self, archive: &str) -> bool {
        self.lock().contains(archive)
    }

    pub fn in_progress(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }
}

/// Releases its archive on drop.
#[derive(Debug)]
pub struct DownloadGuard {
    tracker: DownloadTracker,
    archive: String,
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        self.tracker.lock().remove(&self.archive);
        tracing::trace!(archive = %self.archive, "download finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_busy_until_release() {
        let tracker = DownloadTracker::new();
        let guard = tracker.begin("gnu").unwrap();
        assert!(tracker.is_busy("gnu"));
        assert!(matches!(tracker.begin("gnu"), Err(FetchError::Busy { ref archive }) if archive == "gnu"));

        let other = tracker.clone().begin("melpa").unwrap();
        assert_eq!(tracker.in_progress(), vec!["gnu", "melpa"]);

        drop(guard);
        drop(other);
        assert!(tracker.in_progress().is_empty());
        assert!(tracker.begin("gnu").is_ok());
    }
}
