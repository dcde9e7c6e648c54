//! Logging setup for the command line.
//!
//! All logs go to stderr, keeping stdout free for the result stream.

use std::env;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Installs the global tracing subscriber.
pub fn init_tracing() {
    let (level, env_filter) = parse_rust_log();
    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(level)))
        .with(env_filter)
        .init();
}

/// Interprets `RUST_LOG` as a plain level, or literally if it is a full filter directive.
pub fn parse_rust_log() -> (Level, EnvFilter) {
    parse_filter(env::var(EnvFilter::DEFAULT_ENV).ok())
}

fn parse_filter(rust_log: Option<String>) -> (Level, EnvFilter) {
    let level = match rust_log {
        Some(value) => match value.parse::<Level>() {
            Ok(level) => level,
            Err(_) => return (Level::TRACE, EnvFilter::new(value)),
        },
        None => Level::INFO,
    };

    // Dependencies only report warnings. Our own crate passes everything on to the `level` filter.
    let env_filter = EnvFilter::new("WARN,readwrite=TRACE");

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_info() {
        let (level, filter) = parse_filter(None);
        assert_eq!(level, Level::INFO);

        let filter = filter.to_string();
        assert!(filter.contains("readwrite=trace"), "{filter}");
        assert!(filter.contains("warn"), "{filter}");
    }

    #[test]
    fn plain_level_keeps_dependencies_quiet() {
        let (level, filter) = parse_filter(Some("debug".to_owned()));
        assert_eq!(level, Level::DEBUG);
        assert!(filter.to_string().contains("readwrite=trace"));
    }

    #[test]
    fn directives_are_used_verbatim() {
        let (level, filter) = parse_filter(Some("s3=debug,readwrite=info".to_owned()));
        assert_eq!(level, Level::TRACE);

        let filter = filter.to_string();
        assert!(filter.contains("s3=debug"), "{filter}");
        assert!(!filter.contains("readwrite=trace"), "{filter}");
    }
}
