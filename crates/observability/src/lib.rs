//! Process-wide tracing setup for services embedding the repositories.

/// Subscriber construction (filters, formatters).
pub mod subscriber;

pub use subscriber::{DEFAULT_DIRECTIVE, init_with};

/// Initialize process-wide tracing: JSON lines, filtered by `RUST_LOG`
/// (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    init_with(DEFAULT_DIRECTIVE, true);
}
