//! Logging setup
//!
//! The library only emits through the `log` facade. Binaries and tests pick
//! the backend; these helpers wire up `env_logger`.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize logging from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize logging with a default level, still overridable by `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(level: &str) {
    let filter = parse_level(level).unwrap_or(LevelFilter::Info);
    let _ = env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Parse a level name (`off`, `error`, `warn`, `info`, `debug`, `trace`)
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    level.trim().parse::<LevelFilter>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level(" WARN "), Some(LevelFilter::Warn));
        assert_eq!(parse_level("loud"), None);
    }
}
