//! Tracing subscriber initialization.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_directive`. With `json` off, logs use the
/// compact human format (handy in tests). Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_with(default_directive: &str, json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.compact().with_test_writer().try_init()
    };
    installed.is_ok()
}
