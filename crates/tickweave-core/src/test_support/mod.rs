//! Test support for code built on tickweave.
//!
//! [`SimulatedHost`] implements every host collaborator with real threads: a
//! ticking main thread, a worker pool and, optionally, region threads. It
//! records what it is asked to do so tests can assert on scheduler round
//! trips, forced heartbeats and failure notifications.
//!
//! ```rust,ignore
//! use tickweave_core::test_support::SimulatedHost;
//! use tickweave_core::{OwnerId, SchedulerConfig, SessionRegistry};
//!
//! let host = SimulatedHost::new();
//! let registry = SessionRegistry::new(host.clone(), SchedulerConfig::default());
//! let session = registry.get_or_create(&OwnerId::new("test"))?;
//! ```

mod sim_host;

pub use sim_host::{RecordedException, SimThread, SimulatedHost};

use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber. Honors `RUST_LOG`, defaults to `debug`.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Poll `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
