//! Tracing initialization.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
///
/// Format: `DAX_LOG=docs_assistant=debug,docs_assistant_core=info`
pub const LOG_ENV: &str = "DAX_LOG";

const DEFAULT_FILTER: &str = "docs_assistant=info,docs_assistant_core=info";

/// Install the global subscriber, writing to stderr so command output on
/// stdout stays machine-readable.
///
/// Falls back to `docs_assistant=info` when `DAX_LOG` is unset or invalid.
/// A second call is a no-op.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
