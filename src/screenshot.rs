//! Screenshot and tab-status collaborators

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Opaque identifier of the tab being recorded (a CDP target id for Chrome)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetHandle(pub String);

impl TargetHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    /// Capture the visible viewport as an encoded image (a data URL).
    ///
    /// `immediate` skips any normalization to keep latency minimal. Failures
    /// are reported as `None`, never as errors.
    async fn capture_current_view(&self, target: &TargetHandle, immediate: bool) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadStatus {
    Loading,
    Complete,
}

/// Host view of a tab's load state (`document.readyState` for Chrome)
#[async_trait]
pub trait TabStatus: Send + Sync {
    async fn load_status(&self, target: &TargetHandle) -> Result<LoadStatus>;
}

/// Tab status for hosts that only hand over fully loaded pages
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeLoaded;

#[async_trait]
impl TabStatus for AssumeLoaded {
    async fn load_status(&self, _target: &TargetHandle) -> Result<LoadStatus> {
        Ok(LoadStatus::Complete)
    }
}

const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll until the tab reports load complete; `false` if `limit` elapsed first
pub async fn wait_for_load_complete(tabs: &dyn TabStatus, target: &TargetHandle, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        match tabs.load_status(target).await {
            Ok(LoadStatus::Complete) => return true,
            Ok(LoadStatus::Loading) => {}
            Err(e) => log::debug!("Load status for {} unavailable: {}", target, e),
        }
        if Instant::now() >= deadline {
            log::warn!("Tab {} did not finish loading within {}ms", target, limit.as_millis());
            return false;
        }
        sleep(LOAD_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct LoadsAfter {
        polls: AtomicUsize,
        complete_after: usize,
    }

    #[async_trait]
    impl TabStatus for LoadsAfter {
        async fn load_status(&self, _target: &TargetHandle) -> Result<LoadStatus> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(if n >= self.complete_after {
                LoadStatus::Complete
            } else {
                LoadStatus::Loading
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_load_complete() {
        let tabs = LoadsAfter {
            polls: AtomicUsize::new(0),
            complete_after: 3,
        };
        let target = TargetHandle::new("tab-1");
        assert!(wait_for_load_complete(&tabs, &target, Duration::from_secs(5)).await);
        assert_eq!(tabs.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_load_complete_gives_up() {
        let tabs = LoadsAfter {
            polls: AtomicUsize::new(0),
            complete_after: usize::MAX,
        };
        let target = TargetHandle::new("tab-1");
        assert!(!wait_for_load_complete(&tabs, &target, Duration::from_secs(1)).await);
    }
}
