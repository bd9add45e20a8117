//! Explicit recorder state, persisted for crash recovery

use crate::error::{RecorderError, Result};
use crate::screenshot::TargetHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RecorderState {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Recording {
        session_id: String,
        target: TargetHandle,
        started_at: DateTime<Utc>,
        step_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    Stopped {
        session_id: String,
        stopped_at: DateTime<Utc>,
        step_count: usize,
    },
}

impl RecorderState {
    pub fn is_recording(&self) -> bool {
        matches!(self, RecorderState::Recording { .. })
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            RecorderState::Idle => None,
            RecorderState::Recording { session_id, .. } | RecorderState::Stopped { session_id, .. } => {
                Some(session_id)
            }
        }
    }

    pub fn step_count(&self) -> usize {
        match self {
            RecorderState::Idle => 0,
            RecorderState::Recording { step_count, .. } | RecorderState::Stopped { step_count, .. } => {
                *step_count
            }
        }
    }

    /// The state a recording lands in once it ends
    pub fn stopped(&self) -> Option<RecorderState> {
        match self {
            RecorderState::Recording {
                session_id,
                step_count,
                ..
            } => Some(RecorderState::Stopped {
                session_id: session_id.clone(),
                stopped_at: Utc::now(),
                step_count: *step_count,
            }),
            _ => None,
        }
    }
}

/// JSON file holding the last known [`RecorderState`]
#[derive(Debug, Clone)]
pub struct StateFile {
    path: Option<PathBuf>,
}

impl StateFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// A state file that never touches disk
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn load(&self) -> Result<RecorderState> {
        let Some(path) = &self.path else {
            return Ok(RecorderState::Idle);
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecorderState::Idle),
            Err(e) => Err(RecorderError::Storage(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub async fn save(&self, state: &RecorderState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(state)?).await?;
        Ok(())
    }
}
