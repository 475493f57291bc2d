//! Configuration sections.

mod logging;
mod timing;
mod wakeup;

pub use logging::{CancellationLevel, LoggingConfig};
pub use timing::TimingConfig;
pub use wakeup::WakeupConfig;
