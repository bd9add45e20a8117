pub mod chrome;
pub mod live;
pub mod probe;

pub use chrome::{ChromeDriver, ConnectionMode};
pub use live::{attach, LiveRecording};
pub use probe::ChromeProbe;
