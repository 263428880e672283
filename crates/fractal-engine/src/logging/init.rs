use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` uses `env_logger` filter syntax, e.g.
/// `"fractal_engine=debug,wgpu=warn"`. When unset, `RUST_LOG` is consulted, then
/// [`DEFAULT_FILTER`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

/// Filter used when neither the config nor `RUST_LOG` provide one. wgpu is
/// noisy at info.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

static INIT: Once = Once::new();

/// Installs the global logger. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config
            .env_filter
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&filter);
        builder.write_style(config.write_style);
        builder.format_timestamp_millis();

        // Another logger may already be installed (tests, embedding hosts).
        if builder.try_init().is_err() {
            return;
        }

        log::debug!("logging initialized (filter: {filter})");
    });
}
