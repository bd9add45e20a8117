pub mod api;
pub mod browser;
pub mod bus;
pub mod capture;
pub mod config;
pub mod context;
pub mod dom;
pub mod error;
pub mod readiness;
pub mod screenshot;
pub mod selector;
pub mod session;
pub mod step;
pub mod store;

//  Re-export commonly used items
pub use browser::{ChromeDriver, ChromeProbe, ConnectionMode, LiveRecording};
pub use bus::{Command, CommandResponse, MessageBus, RecorderEvent};
pub use capture::{BrowserEvent, CaptureTiming, CapturedStep, EventCaptureCoordinator, EventKind};
pub use config::{CaptureConfig, ReadinessConfig, RecorderConfig, StorageConfig};
pub use context::{extract_context, ElementContext};
pub use dom::{Document, NodeId, PageHandle, SharedDocument};
pub use error::{RecorderError, Result, SelectorError};
pub use readiness::{DocumentProbe, PageReadinessDetector, PageReadinessState, ReadinessProbe};
pub use screenshot::{ScreenshotCapturer, TabStatus, TargetHandle};
pub use selector::{generate_selectors, SelectorStrategy};
pub use session::{Recorder, RecorderState};
pub use step::{Step, StepType, StepUpdate, VisualCapture};
pub use store::{JsonFileStore, MemoryStore, Session, StepStore};
