use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("No page available")]
    NoPage,

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Invalid selector: {0}")]
    InvalidSelector(#[from] SelectorError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Step {step_id} not found in session {session_id}")]
    StepNotFound { session_id: String, step_id: String },

    #[error("No recording in progress")]
    NotRecording,

    #[error("Already recording session {0}")]
    AlreadyRecording(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Failure to parse or evaluate a CSS / XPath locator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("unexpected character {found:?} at offset {offset} in {selector:?}")]
    Unexpected {
        selector: String,
        offset: usize,
        found: char,
    },

    #[error("unterminated {what} in {selector:?}")]
    Unterminated { selector: String, what: &'static str },

    #[error("unsupported pseudo-class :{0}")]
    UnsupportedPseudo(String),

    #[error("unsupported XPath expression {0:?}")]
    UnsupportedXPath(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
