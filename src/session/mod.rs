//! Recording session orchestration
//!
//! [`Recorder`] owns the explicit [`RecorderState`], ties steps to the active
//! session id and applies the per-event capture policy:
//!
//! - every step is saved as soon as it is ingested, in event order;
//! - immediate captures are taken before the step is saved, since the page
//!   is about to unload;
//! - everything else goes through one FIFO capture worker per session, so a
//!   later step can never attach its screenshot before an earlier one.
//!
//! Screenshot calls from both paths share a [`CaptureThrottle`].

pub mod state;
pub mod throttle;

pub use state::{RecorderState, StateFile};
pub use throttle::CaptureThrottle;

use crate::bus::RecorderEvent;
use crate::capture::{BrowserEvent, CaptureTiming, CapturedStep, EventCaptureCoordinator};
use crate::config::RecorderConfig;
use crate::dom::PageHandle;
use crate::error::{RecorderError, Result};
use crate::readiness::{PageReadinessDetector, PageReadinessState, ReadinessProbe};
use crate::screenshot::{wait_for_load_complete, ScreenshotCapturer, TabStatus, TargetHandle};
use crate::step::{CaptureMode, Step, StepUpdate, VisualCapture};
use crate::store::StepStore;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The page the recorder observes: its host handle plus an in-page probe
#[derive(Clone)]
pub struct AttachedPage {
    pub target: TargetHandle,
    pub probe: Arc<dyn ReadinessProbe>,
}

struct CaptureJob {
    step_id: String,
    timing: CaptureTiming,
    pre_captured: Option<VisualCapture>,
}

struct CaptureWorker {
    queue: mpsc::UnboundedSender<CaptureJob>,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn StepStore>,
    screenshots: Arc<dyn ScreenshotCapturer>,
    tabs: Arc<dyn TabStatus>,
    config: RecorderConfig,
    coordinator: EventCaptureCoordinator,
    detector: PageReadinessDetector,
    throttle: CaptureThrottle,
    state_file: StateFile,
    state: Mutex<RecorderState>,
    page: RwLock<Option<AttachedPage>>,
    worker: Mutex<Option<CaptureWorker>>,
    events: broadcast::Sender<RecorderEvent>,
}

#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Inner>,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        store: Arc<dyn StepStore>,
        screenshots: Arc<dyn ScreenshotCapturer>,
        tabs: Arc<dyn TabStatus>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                coordinator: EventCaptureCoordinator::new(config.capture.clone()),
                detector: PageReadinessDetector::new(config.readiness.clone()),
                throttle: CaptureThrottle::new(config.capture.min_capture_interval),
                state_file: StateFile::new(config.storage.state_file.clone()),
                state: Mutex::new(RecorderState::Idle),
                page: RwLock::new(None),
                worker: Mutex::new(None),
                store,
                screenshots,
                tabs,
                config,
                events,
            }),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn StepStore> {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> RecorderState {
        self.inner.state.lock().await.clone()
    }

    /// Load the persisted state. A recording that was still running when the
    /// process died is closed as stopped, since its page is gone.
    pub async fn restore_state(&self) -> Result<RecorderState> {
        let mut restored = self.inner.state_file.load().await?;
        if let Some(stopped) = restored.stopped() {
            log::warn!(
                "Recording {} was interrupted, marking it stopped",
                restored.session_id().unwrap_or_default()
            );
            restored = stopped;
            self.inner.state_file.save(&restored).await?;
        }
        *self.inner.state.lock().await = restored.clone();
        Ok(restored)
    }

    /// Point the recorder at a page
    pub async fn attach_page(&self, target: TargetHandle, probe: Arc<dyn ReadinessProbe>) {
        log::info!("Attached page {}", target);
        *self.inner.page.write().await = Some(AttachedPage { target, probe });
    }

    pub async fn attached_page(&self) -> Option<AttachedPage> {
        self.inner.page.read().await.clone()
    }

    async fn require_page(&self) -> Result<AttachedPage> {
        self.attached_page().await.ok_or(RecorderError::NoPage)
    }

    /// Create a session and start recording the attached page
    pub async fn start_recording(&self, metadata: Map<String, Value>) -> Result<String> {
        let mut state = self.inner.state.lock().await;
        if let RecorderState::Recording { session_id, .. } = &*state {
            return Err(RecorderError::AlreadyRecording(session_id.clone()));
        }
        let page = self.require_page().await?;
        let session_id = self.inner.store.create_session(metadata).await?;

        let (queue, jobs) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_capture_worker(
            self.inner.clone(),
            session_id.clone(),
            page.clone(),
            jobs,
        ));
        *self.inner.worker.lock().await = Some(CaptureWorker { queue, handle });

        *state = RecorderState::Recording {
            session_id: session_id.clone(),
            target: page.target.clone(),
            started_at: Utc::now(),
            step_count: 0,
        };
        self.inner.persist_state(&state).await;

        log::info!("Recording session {} on {}", session_id, page.target);
        self.inner.emit(RecorderEvent::RecordingStarted {
            session_id: session_id.clone(),
            target: page.target,
        });
        Ok(session_id)
    }

    /// Stop recording after pending captures have been attached
    pub async fn stop_recording(&self) -> Result<RecorderState> {
        let mut state = self.inner.state.lock().await;
        let stopped = state.stopped().ok_or(RecorderError::NotRecording)?;

        if let Some(worker) = self.inner.worker.lock().await.take() {
            drop(worker.queue);
            if let Err(e) = worker.handle.await {
                log::error!("Capture worker ended abnormally: {}", e);
            }
        }

        *state = stopped.clone();
        self.inner.persist_state(&state).await;

        log::info!(
            "Stopped recording {} with {} step(s)",
            stopped.session_id().unwrap_or_default(),
            stopped.step_count()
        );
        self.inner.emit(RecorderEvent::RecordingStopped {
            session_id: stopped.session_id().unwrap_or_default().to_string(),
            step_count: stopped.step_count(),
        });
        Ok(stopped)
    }

    /// Save an already assembled step into the active session, without capture
    pub async fn record_step(&self, mut step: Step) -> Result<String> {
        let mut state = self.inner.state.lock().await;
        let session_id = active_session(&state)?;
        step.session_id = session_id.clone();
        self.inner.save_step(&mut state, step).await
    }

    /// Turn a browser event on `page` into a recorded step.
    ///
    /// Returns `Ok(None)` when the event was filtered out.
    pub async fn handle_event<P>(&self, page: &P, event: &BrowserEvent) -> Result<Option<String>>
    where
        P: PageHandle + Sync + ?Sized,
    {
        let session_id = {
            let state = self.inner.state.lock().await;
            active_session(&state)?
        };
        match self.inner.coordinator.process(page, &session_id, event) {
            Some(captured) => self.ingest(captured).await.map(Some),
            None => Ok(None),
        }
    }

    /// Save a captured step and schedule its screenshot per its timing
    pub async fn ingest(&self, captured: CapturedStep) -> Result<String> {
        let CapturedStep { mut step, timing } = captured;
        let mut state = self.inner.state.lock().await;
        let session_id = active_session(&state)?;
        let RecorderState::Recording { target, .. } = &*state else {
            return Err(RecorderError::NotRecording);
        };
        let target = target.clone();
        step.session_id = session_id;

        let pre_captured = if timing == CaptureTiming::Immediate {
            let started = Instant::now();
            let visual = self
                .inner
                .capture(&target, true, CaptureMode::Immediate, None)
                .await;
            log::debug!(
                "Immediate capture for {:?} took {}ms",
                step.step_type,
                started.elapsed().as_millis()
            );
            visual
        } else {
            None
        };

        let step_id = self.inner.save_step(&mut state, step).await?;

        if timing.captures() {
            let job = CaptureJob {
                step_id: step_id.clone(),
                timing,
                pre_captured,
            };
            match self.inner.worker.lock().await.as_ref() {
                Some(worker) if worker.queue.send(job).is_ok() => {}
                _ => log::warn!("Capture worker unavailable, step {} keeps no screenshot", step_id),
            }
        }
        Ok(step_id)
    }

    /// Run the readiness pipeline against the attached page
    pub async fn wait_for_page_ready(&self) -> Result<PageReadinessState> {
        let page = self.require_page().await?;
        Ok(self.inner.detector.wait_for_page_ready(page.probe.as_ref()).await)
    }

    /// Wait for readiness, then take a screenshot outside of any step
    pub async fn capture_now(&self) -> Result<Option<VisualCapture>> {
        let page = self.require_page().await?;
        let readiness = self.inner.detector.wait_for_page_ready(page.probe.as_ref()).await;
        Ok(self
            .inner
            .capture(&page.target, false, CaptureMode::Manual, Some(readiness))
            .await)
    }
}

fn active_session(state: &RecorderState) -> Result<String> {
    match state {
        RecorderState::Recording { session_id, .. } => Ok(session_id.clone()),
        _ => Err(RecorderError::NotRecording),
    }
}

impl Inner {
    fn emit(&self, event: RecorderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn persist_state(&self, state: &RecorderState) {
        if let Err(e) = self.state_file.save(state).await {
            log::warn!("Failed to persist recorder state: {}", e);
        }
    }

    /// Persist a step and count it; a failed save leaves the state untouched
    async fn save_step(&self, state: &mut RecorderState, step: Step) -> Result<String> {
        let step_id = step.id.clone();
        let step_type = step.step_type;
        let session_id = step.session_id.clone();

        if let Err(e) = self.store.add_step(&session_id, step).await {
            log::warn!("Dropping {:?} step {}: {}", step_type, step_id, e);
            return Err(e);
        }

        if let RecorderState::Recording { step_count, .. } = state {
            *step_count += 1;
        }
        self.persist_state(state).await;

        log::debug!("Recorded {:?} step {} in {}", step_type, step_id, session_id);
        self.emit(RecorderEvent::StepRecorded {
            session_id,
            step_id: step_id.clone(),
            step_type,
        });
        Ok(step_id)
    }

    async fn capture(
        &self,
        target: &TargetHandle,
        immediate: bool,
        mode: CaptureMode,
        readiness: Option<PageReadinessState>,
    ) -> Option<VisualCapture> {
        self.throttle.acquire().await;
        match self.screenshots.capture_current_view(target, immediate).await {
            Some(image) => Some(VisualCapture::new(image, mode, readiness)),
            None => {
                log::warn!("Screenshot of {} failed", target);
                None
            }
        }
    }

    async fn attach_visual(&self, session_id: &str, page: &AttachedPage, job: CaptureJob) {
        let started = Instant::now();
        let visual = match job.pre_captured {
            Some(visual) => Some(visual),
            None => {
                let (mode, readiness) = match job.timing {
                    CaptureTiming::AfterLoadComplete => {
                        wait_for_load_complete(
                            self.tabs.as_ref(),
                            &page.target,
                            self.config.readiness.page_load_timeout,
                        )
                        .await;
                        let readiness = self.detector.wait_for_page_ready(page.probe.as_ref()).await;
                        (CaptureMode::AfterLoadComplete, Some(readiness))
                    }
                    CaptureTiming::AfterReadiness => {
                        let readiness = self.detector.wait_for_page_ready(page.probe.as_ref()).await;
                        (CaptureMode::AfterReadiness, Some(readiness))
                    }
                    // Immediate captures that failed up front are not retried
                    CaptureTiming::Immediate | CaptureTiming::None => {
                        self.emit(RecorderEvent::CaptureFailed {
                            session_id: session_id.to_string(),
                            step_id: job.step_id,
                            reason: "screenshot unavailable".to_string(),
                        });
                        return;
                    }
                };
                self.capture(&page.target, false, mode, readiness).await
            }
        };

        let Some(visual) = visual else {
            log::warn!("Step {} saved without a screenshot", job.step_id);
            self.emit(RecorderEvent::CaptureFailed {
                session_id: session_id.to_string(),
                step_id: job.step_id,
                reason: "screenshot unavailable".to_string(),
            });
            return;
        };

        let mut update = StepUpdate {
            visual: Some(visual),
            ..Default::default()
        };
        update
            .metadata
            .insert("captureMs".to_string(), (started.elapsed().as_millis() as u64).into());

        match self.store.update_step(session_id, &job.step_id, update).await {
            Ok(()) => self.emit(RecorderEvent::StepCaptured {
                session_id: session_id.to_string(),
                step_id: job.step_id,
            }),
            Err(e) => {
                log::warn!("Failed to attach screenshot to step {}: {}", job.step_id, e);
                self.emit(RecorderEvent::CaptureFailed {
                    session_id: session_id.to_string(),
                    step_id: job.step_id,
                    reason: e.to_string(),
                });
            }
        }
    }
}

async fn run_capture_worker(
    inner: Arc<Inner>,
    session_id: String,
    page: AttachedPage,
    mut jobs: mpsc::UnboundedReceiver<CaptureJob>,
) {
    while let Some(job) = jobs.recv().await {
        inner.attach_visual(&session_id, &page, job).await;
    }
    log::debug!("Capture worker for {} finished", session_id);
}
