mod config;
mod studio;

use anyhow::{Context, Result};
use fractal_engine::device::GpuInit;
use fractal_engine::logging::{init_logging, LoggingConfig};
use fractal_engine::window::{Runtime, RuntimeConfig};

use crate::config::StudioConfig;
use crate::studio::Studio;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = StudioConfig::from_env().context("invalid studio configuration")?;
    log::info!(
        "starting fractal studio: depth {}, workers {}",
        config.depth,
        config
            .worker_threads
            .map_or_else(|| "auto".to_string(), |n| n.to_string())
    );

    Runtime::run(
        RuntimeConfig {
            title: Studio::title(config.depth),
            ..RuntimeConfig::default()
        },
        GpuInit::default(),
        Studio::new(config),
    )
}
