//! Logger setup for the binary. Library code logs through the `log` macros.
//!
//! The level comes from `CHESS_LOG`, which accepts either a bare level
//! (`warn`, `warning`, `err`, ...) or a full `env_logger` filter spec such as
//! `chess_prep=debug`.

use std::env;

use env_logger::Builder;

pub const LOG_ENV: &str = "CHESS_LOG";
const DEFAULT_FILTER: &str = "info";

fn filter_spec(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_lowercase().as_str() {
        "" => DEFAULT_FILTER.to_string(),
        "error" | "err" => "error".to_string(),
        "warn" | "warning" => "warn".to_string(),
        "info" => "info".to_string(),
        "debug" => "debug".to_string(),
        "trace" => "trace".to_string(),
        "off" | "none" => "off".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Install the global logger. Calling it twice is harmless.
pub fn init() {
    let spec = env::var(LOG_ENV)
        .map(|s| filter_spec(&s))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    let _ = Builder::new()
        .parse_filters(&spec)
        .format_timestamp_millis()
        .try_init();
}
