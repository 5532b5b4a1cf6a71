//! Process-wide tracing setup shared by the warden binaries and tests.

pub mod tracing;

pub use crate::tracing::{LogFormat, TracingConfig};

/// Initialize process-wide tracing with the defaults.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() {
    crate::tracing::init(&TracingConfig::default());
}
