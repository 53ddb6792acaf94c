use std::sync::Once;

use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Pick the filter directive: `RUST_LOG` wins, then `--verbose`, then the configured level.
pub fn filter_directive(rust_log: Option<&str>, verbose: bool, configured: &str) -> String {
    match rust_log {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ if verbose => "debug".to_string(),
        _ => configured.to_string(),
    }
}

pub fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout belongs to command output
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

static INIT: Once = Once::new();

pub fn init_logging(verbose: bool, configured_level: &str) {
    INIT.call_once(|| {
        let rust_log = std::env::var("RUST_LOG").ok();
        init_tracing(&filter_directive(rust_log.as_deref(), verbose, configured_level));
    });
}
