//! Tracing initialisation for the `git-maintain` binary.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! since the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Target prefix of the CI backends, raised to `debug` by `ci_debug`.
pub const CI_TARGET: &str = "gitmaint_ci";

/// Filter directives for the given defaults. `RUST_LOG` wins when set.
pub fn filter_directives(level: Level, ci_debug: bool) -> String {
    let mut directives = level.as_str().to_ascii_lowercase();
    if ci_debug {
        directives.push_str(&format!(",{CI_TARGET}=debug"));
    }
    directives
}

/// Initialise the global subscriber.
///
/// * `json`: newline-delimited JSON instead of human-readable lines.
/// * `level`: default verbosity when `RUST_LOG` is unset.
/// * `ci_debug`: debug output for the CI backends only.
pub fn init_tracing(json: bool, level: Level, ci_debug: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level, ci_debug)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .ok();
    }
}
