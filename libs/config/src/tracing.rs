//! Tracing subscriber initialization.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::log::{LogConfig, LogFormat};

/// Initialize the global tracing subscriber from the log configuration.
///
/// `RUST_LOG` overrides the configured level when set. JSON output is
/// intended for log aggregation; console output is pretty-printed for
/// development.
///
/// Safe to call multiple times: a second call (common in tests) is a
/// silent no-op.
pub fn init(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(filter)
            .try_init(),
        LogFormat::Console => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(false).pretty())
            .with(filter)
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing already initialized, skipping re-initialization");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_console() {
        init(&LogConfig::default());
    }

    #[test]
    fn test_init_multiple_calls() {
        let config = LogConfig {
            level: "debug".to_string(),
            format: LogFormat::Json,
        };
        init(&config);
        init(&config);
    }

    #[test]
    fn test_init_with_rust_log_override() {
        temp_env::with_var("RUST_LOG", Some("warn"), || {
            init(&LogConfig::default());
        });
    }
}
