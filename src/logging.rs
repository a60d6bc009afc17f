//! Diagnostic tracing for the CLI
//!
//! Logs go to stderr so stdout stays clean for DOT and JSON output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `warn`, or `diagtree=debug` with
/// `verbose`.
///
/// ```bash
/// RUST_LOG=diagtree=trace diagtree merge path.json
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "diagtree=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
