//! Command/response bus in front of the [`Recorder`]
//!
//! Requests travel over an `mpsc` channel with a `oneshot` reply; recorder
//! notifications fan out over a `broadcast` channel. Transport-facing code
//! (the HTTP routes, the live page bridge) only ever sees [`Command`],
//! [`CommandResponse`] and [`RecorderEvent`].

use crate::error::{RecorderError, Result};
use crate::screenshot::TargetHandle;
use crate::session::Recorder;
use crate::step::{Step, StepType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, oneshot};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    StartRecording {
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    StopRecording,
    RecordStep {
        step: Box<Step>,
    },
    GetState,
    #[serde(rename_all = "camelCase")]
    GetSession {
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteSession {
        session_id: String,
    },
    WaitForPageReady,
    CaptureNow,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartRecording { .. } => "startRecording",
            Command::StopRecording => "stopRecording",
            Command::RecordStep { .. } => "recordStep",
            Command::GetState => "getState",
            Command::GetSession { .. } => "getSession",
            Command::DeleteSession { .. } => "deleteSession",
            Command::WaitForPageReady => "waitForPageReady",
            Command::CaptureNow => "captureNow",
        }
    }

    /// Commands that may wait on the page and must not hold up the queue
    fn is_long_running(&self) -> bool {
        matches!(self, Command::WaitForPageReady | Command::CaptureNow)
    }
}

/// Structured result of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResponse {
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(Value::Null) => Self {
                success: true,
                error: None,
                data: None,
            },
            Ok(data) => Self {
                success: true,
                error: None,
                data: Some(data),
            },
            Err(e) => Self::failure(e),
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            data: None,
        }
    }

    fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(e),
        }
    }
}

/// Fire-and-forget notifications from the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RecorderEvent {
    #[serde(rename_all = "camelCase")]
    RecordingStarted {
        session_id: String,
        target: TargetHandle,
    },
    #[serde(rename_all = "camelCase")]
    StepRecorded {
        session_id: String,
        step_id: String,
        step_type: StepType,
    },
    #[serde(rename_all = "camelCase")]
    StepCaptured { session_id: String, step_id: String },
    #[serde(rename_all = "camelCase")]
    CaptureFailed {
        session_id: String,
        step_id: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    RecordingStopped { session_id: String, step_count: usize },
}

struct Envelope {
    command: Command,
    reply: Option<oneshot::Sender<CommandResponse>>,
}

/// Cloneable client handle; the dispatcher runs until every handle is dropped
#[derive(Clone)]
pub struct MessageBus {
    commands: mpsc::Sender<Envelope>,
    recorder: Recorder,
}

impl MessageBus {
    /// Spawn the dispatcher for `recorder`
    pub fn spawn(recorder: Recorder) -> Self {
        let (commands, inbox) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        tokio::spawn(run_dispatcher(recorder.clone(), inbox));
        Self { commands, recorder }
    }

    /// Send a command and wait for its response
    pub async fn request(&self, command: Command) -> CommandResponse {
        let (reply, response) = oneshot::channel();
        let name = command.name();
        if self
            .commands
            .send(Envelope {
                command,
                reply: Some(reply),
            })
            .await
            .is_err()
        {
            return CommandResponse::failure(format!("Message bus closed before {}", name));
        }
        response
            .await
            .unwrap_or_else(|_| CommandResponse::failure(format!("No response to {}", name)))
    }

    /// Send a command without waiting for the outcome
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(Envelope {
                command,
                reply: None,
            })
            .await
            .map_err(|e| RecorderError::Other(format!("Message bus closed: {}", e.0.command.name())))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.recorder.subscribe()
    }
}

async fn run_dispatcher(recorder: Recorder, mut inbox: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { command, reply }) = inbox.recv().await {
        log::debug!("Dispatching {}", command.name());
        if command.is_long_running() {
            let recorder = recorder.clone();
            tokio::spawn(async move {
                respond(reply, dispatch(&recorder, command).await);
            });
        } else {
            respond(reply, dispatch(&recorder, command).await);
        }
    }
    log::debug!("Message bus dispatcher stopped");
}

fn respond(reply: Option<oneshot::Sender<CommandResponse>>, response: CommandResponse) {
    if !response.success {
        log::warn!("Command failed: {}", response.error.as_deref().unwrap_or_default());
    }
    if let Some(reply) = reply {
        // The requester may have given up waiting
        let _ = reply.send(response);
    }
}

/// Execute one command against the recorder
pub async fn dispatch(recorder: &Recorder, command: Command) -> CommandResponse {
    match command {
        Command::StartRecording { metadata } => CommandResponse::from_result(
            recorder
                .start_recording(metadata)
                .await
                .map(|session_id| serde_json::json!({ "sessionId": session_id })),
        ),
        Command::StopRecording => CommandResponse::from_result(recorder.stop_recording().await),
        Command::RecordStep { step } => CommandResponse::from_result(
            recorder
                .record_step(*step)
                .await
                .map(|step_id| serde_json::json!({ "stepId": step_id })),
        ),
        Command::GetState => CommandResponse::ok(recorder.state().await),
        Command::GetSession { session_id } => {
            match recorder.store().get_session(&session_id).await {
                Ok(Some(session)) => CommandResponse::ok(session),
                Ok(None) => CommandResponse::failure(RecorderError::SessionNotFound(session_id)),
                Err(e) => CommandResponse::failure(e),
            }
        }
        Command::DeleteSession { session_id } => {
            let state = recorder.state().await;
            if state.is_recording() && state.session_id() == Some(session_id.as_str()) {
                return CommandResponse::failure(RecorderError::AlreadyRecording(session_id));
            }
            CommandResponse::from_result(recorder.store().delete_session(&session_id).await)
        }
        Command::WaitForPageReady => CommandResponse::from_result(recorder.wait_for_page_ready().await),
        Command::CaptureNow => match recorder.capture_now().await {
            Ok(Some(visual)) => CommandResponse::ok(visual),
            Ok(None) => CommandResponse::failure("Screenshot unavailable"),
            Err(e) => CommandResponse::failure(e),
        },
    }
}
