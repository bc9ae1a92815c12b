//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
///
/// `--verbose` raises this crate to `debug` on top of the configured level.
pub fn default_directive(config_level: &str, verbose: bool) -> String {
    let level = config_level.trim();
    let level = if level.is_empty() { "info" } else { level };
    if verbose {
        format!("{},pgbsync=debug", level)
    } else {
        level.to_string()
    }
}

/// Install the global subscriber, logging to stderr.
///
/// `RUST_LOG` takes precedence over `--verbose`, which takes precedence over
/// the configured `log_level`. A second call is a no-op.
pub fn init_tracing(config_level: &str, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config_level, verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
