//! Session and step persistence
//!
//! [`StepStore`] is the narrow key-value contract the recorder writes
//! through. [`MemoryStore`] keeps everything in process; [`JsonFileStore`]
//! writes one pretty-printed JSON file per session and one PNG per
//! screenshot next to it.

use crate::error::{RecorderError, Result};
use crate::step::{Step, StepUpdate, VisualCapture};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Step ids in recording order
    #[serde(default)]
    pub step_ids: Vec<String>,
    #[serde(default)]
    pub steps: BTreeMap<String, Step>,
}

impl Session {
    pub fn new(metadata: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            metadata,
            step_ids: Vec::new(),
            steps: BTreeMap::new(),
        }
    }

    /// Steps in recording order
    pub fn ordered_steps(&self) -> Vec<&Step> {
        self.step_ids.iter().filter_map(|id| self.steps.get(id)).collect()
    }

    /// Insert or replace a step; re-adding an id keeps its original position
    pub fn upsert_step(&mut self, step: Step) {
        if !self.steps.contains_key(&step.id) {
            self.step_ids.push(step.id.clone());
        }
        self.steps.insert(step.id.clone(), step);
    }

    pub fn update_step(&mut self, step_id: &str, update: StepUpdate) -> Result<()> {
        let step = self
            .steps
            .get_mut(step_id)
            .ok_or_else(|| RecorderError::StepNotFound {
                session_id: self.id.clone(),
                step_id: step_id.to_string(),
            })?;
        step.apply(update);
        Ok(())
    }
}

#[async_trait]
pub trait StepStore: Send + Sync {
    /// Create an empty session and return its id
    async fn create_session(&self, metadata: Map<String, Value>) -> Result<String>;

    /// Save a step; saving the same step id again replaces it
    async fn add_step(&self, session_id: &str, step: Step) -> Result<()>;

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    async fn update_step(&self, session_id: &str, step_id: &str, update: StepUpdate) -> Result<()>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepStore for MemoryStore {
    async fn create_session(&self, metadata: Map<String, Value>) -> Result<String> {
        let session = Session::new(metadata);
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        Ok(id)
    }

    async fn add_step(&self, session_id: &str, step: Step) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| RecorderError::SessionNotFound(session_id.to_string()))?;
        session.upsert_step(step);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn update_step(&self, session_id: &str, step_id: &str, update: StepUpdate) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| RecorderError::SessionNotFound(session_id.to_string()))?;
        session.update_step(step_id, update)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| RecorderError::SessionNotFound(session_id.to_string()))
    }
}

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// `<session-id>.json` per session under a directory, with screenshots
/// written to `<session-id>/<step-id>.png`
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            RecorderError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        if !is_file_safe(session_id) {
            return Err(RecorderError::SessionNotFound(session_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", session_id)))
    }

    /// Directory holding a session's screenshots
    pub fn screenshot_dir(&self, session_id: &str) -> Result<PathBuf> {
        self.session_path(session_id)?;
        Ok(self.dir.join(session_id))
    }

    async fn read(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.session_path(session_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RecorderError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn load(&self, session_id: &str) -> Result<Session> {
        self.read(session_id)
            .await?
            .ok_or_else(|| RecorderError::SessionNotFound(session_id.to_string()))
    }

    async fn write(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.id)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RecorderError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| RecorderError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Move an inline PNG out to its own file, leaving the path and hash behind
    async fn store_screenshot(
        &self,
        session_id: &str,
        step_id: &str,
        visual: &mut VisualCapture,
    ) -> Result<()> {
        let Some(encoded) = visual.screenshot.strip_prefix(PNG_DATA_URL_PREFIX) else {
            return Ok(());
        };
        if !is_file_safe(step_id) {
            return Err(RecorderError::StepNotFound {
                session_id: session_id.to_string(),
                step_id: step_id.to_string(),
            });
        }
        let png = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                RecorderError::Storage(format!("Invalid screenshot for step {}: {}", step_id, e))
            })?;

        let dir = self.screenshot_dir(session_id)?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            RecorderError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        let path = dir.join(format!("{}.png", step_id));
        tokio::fs::write(&path, &png)
            .await
            .map_err(|e| RecorderError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
        log::debug!("Wrote {} byte screenshot to {}", png.len(), path.display());

        visual.path = Some(path.to_string_lossy().to_string());
        visual.screenshot.clear();
        Ok(())
    }
}

#[async_trait]
impl StepStore for JsonFileStore {
    async fn create_session(&self, metadata: Map<String, Value>) -> Result<String> {
        let session = Session::new(metadata);
        let _guard = self.write_lock.lock().await;
        self.write(&session).await?;
        log::debug!("Created session {} in {}", session.id, self.dir.display());
        Ok(session.id)
    }

    async fn add_step(&self, session_id: &str, mut step: Step) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load(session_id).await?;
        if let Some(visual) = step.visual.as_mut() {
            self.store_screenshot(session_id, &step.id, visual).await?;
        }
        session.upsert_step(step);
        self.write(&session).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.read(session_id).await
    }

    async fn update_step(
        &self,
        session_id: &str,
        step_id: &str,
        mut update: StepUpdate,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load(session_id).await?;
        if session.steps.contains_key(step_id) {
            if let Some(visual) = update.visual.as_mut() {
                self.store_screenshot(session_id, step_id, visual).await?;
            }
        }
        session.update_step(step_id, update)?;
        self.write(&session).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.session_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecorderError::SessionNotFound(session_id.to_string()));
            }
            Err(e) => {
                return Err(RecorderError::Storage(format!(
                    "Failed to delete {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        let screenshots = self.screenshot_dir(session_id)?;
        match tokio::fs::remove_dir_all(&screenshots).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecorderError::Storage(format!(
                "Failed to delete {}: {}",
                screenshots.display(),
                e
            ))),
        }
    }
}

/// Ids become file names, so only `[A-Za-z0-9_-]` is accepted
fn is_file_safe(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{compute_string_hash, CaptureMode, StepType};

    #[tokio::test]
    async fn test_memory_store_add_is_idempotent() {
        let store = MemoryStore::new();
        let session_id = store.create_session(Map::new()).await.unwrap();

        let step = Step::new(&session_id, StepType::Click, 1, "#a");
        store.add_step(&session_id, step.clone()).await.unwrap();
        store.add_step(&session_id, step.clone()).await.unwrap();
        store
            .add_step(&session_id, Step::new(&session_id, StepType::Click, 2, "#b"))
            .await
            .unwrap();

        let session = store.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(session.step_ids.len(), 2);
        assert_eq!(session.ordered_steps()[0].selector, "#a");
        assert_eq!(session.ordered_steps()[1].selector, "#b");
    }

    #[tokio::test]
    async fn test_memory_store_errors() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.add_step("missing", Step::new("missing", StepType::Click, 1, "#a")).await,
            Err(RecorderError::SessionNotFound(_))
        ));

        let session_id = store.create_session(Map::new()).await.unwrap();
        assert!(matches!(
            store.update_step(&session_id, "nope", StepUpdate::default()).await,
            Err(RecorderError::StepNotFound { .. })
        ));

        store.delete_session(&session_id).await.unwrap();
        assert!(store.get_session(&session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).await.unwrap();
        assert!(store.get_session("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_json_file_store_writes_screenshots_beside_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).await.unwrap();
        let session_id = store.create_session(Map::new()).await.unwrap();

        let image = "data:image/png;base64,iVBORw0KGgo=".to_string();
        let mut step = Step::new(&session_id, StepType::Click, 1, "#a");
        step.visual = Some(VisualCapture::new(image.clone(), CaptureMode::Immediate, None));
        let step_id = step.id.clone();
        store.add_step(&session_id, step).await.unwrap();

        let late = Step::new(&session_id, StepType::Click, 2, "#b");
        let late_id = late.id.clone();
        store.add_step(&session_id, late).await.unwrap();
        let update = StepUpdate {
            visual: Some(VisualCapture::new(image.clone(), CaptureMode::AfterReadiness, None)),
            ..Default::default()
        };
        store.update_step(&session_id, &late_id, update).await.unwrap();

        let shots = dir.path().join(&session_id);
        for id in [&step_id, &late_id] {
            let png = std::fs::read(shots.join(format!("{}.png", id))).unwrap();
            assert_eq!(&png[1..4], b"PNG");
        }

        let session = store.get_session(&session_id).await.unwrap().unwrap();
        let visual = session.steps[&step_id].visual.as_ref().unwrap();
        assert!(visual.screenshot.is_empty());
        assert_eq!(visual.hash, compute_string_hash(&image));
        assert!(visual.path.as_deref().unwrap().ends_with(&format!("{}.png", step_id)));

        let json = std::fs::read_to_string(dir.path().join(format!("{}.json", session_id))).unwrap();
        assert!(!json.contains("iVBORw0KGgo"));

        store.delete_session(&session_id).await.unwrap();
        assert!(!shots.exists());
    }
}
