//! Logger installation

use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` uses the `env_logger` filter syntax, e.g. `"scene_renderer=debug"`.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggerConfig {
    pub fn with_filter(filter: &str) -> Self {
        Self {
            env_filter: Some(filter.to_string()),
            ..Default::default()
        }
    }
}

static INIT: Once = Once::new();

/// Install the global logger. Later calls are ignored.
///
/// Without an explicit filter `RUST_LOG` is honored, falling back to `info`.
pub fn init(config: LoggerConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Info);
        }
        builder.write_style(config.write_style);

        // Another logger may already be installed by the host or a test harness.
        if builder.try_init().is_err() {
            log::debug!("logger already installed, keeping it");
            return;
        }
        log::debug!("logging initialized");
    });
}
