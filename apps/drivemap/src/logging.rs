//! Logger setup.
//!
//! Everything logs through the `log` facade; `env_logger` writes it to stderr. `RUST_LOG`
//! takes precedence over the configured level, so a single module can be turned up in the field.

use log::LevelFilter;

/// Maps a level name to a filter. Unknown names fall back to `info`.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Installs the global logger. Safe to call more than once; later calls are ignored.
pub fn init(level: &str) {
    let filter = level_filter(level);
    let result = env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
    if result.is_ok() {
        log::debug!("Logging at {filter}");
    }
}
