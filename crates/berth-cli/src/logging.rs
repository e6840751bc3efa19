//! Log level normalization and tracing bootstrap

use tracing_subscriber::EnvFilter;

/// Levels accepted in config and on the command line
pub const ALLOWED_LOG_LEVELS: &[&str] = &["silent", "fatal", "error", "warn", "info", "debug", "trace"];

/// Trim and validate a level name, falling back when it is missing or unknown
pub fn normalize_log_level<'a>(level: Option<&'a str>, fallback: &'a str) -> &'a str {
    let candidate = level.unwrap_or(fallback).trim();
    ALLOWED_LOG_LEVELS
        .iter()
        .copied()
        .find(|l| *l == candidate)
        .unwrap_or(fallback)
}

/// Map a normalized level to a tracing filter directive
pub fn level_directive(level: &str) -> &'static str {
    match level {
        "silent" => "off",
        "fatal" | "error" => "error",
        "warn" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
