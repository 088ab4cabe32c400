//! Process-wide tracing setup shared by the binaries and black-box tests.

/// Subscriber construction (filters, output format).
pub mod tracing;

pub use crate::tracing::{DEFAULT_FILTER, LogFormat};

/// Install JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init() {
    tracing::init(LogFormat::Json);
}
