use std::num::NonZeroUsize;

use fractal_engine::fractal::{ConfigError, Depth};

pub const DEPTH_VAR: &str = "FRACTAL_DEPTH";
pub const WORKERS_VAR: &str = "FRACTAL_WORKERS";

/// Start-up configuration, read from the environment.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StudioConfig {
    pub depth: Depth,
    pub worker_threads: Option<NonZeroUsize>,
}

impl StudioConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset variables fall back to defaults; set but malformed ones are errors.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let depth = match lookup(DEPTH_VAR) {
            Some(raw) => parse_depth(&raw)?,
            None => Depth::default(),
        };
        let worker_threads = lookup(WORKERS_VAR).map(|raw| parse_workers(&raw)).transpose()?;

        Ok(Self {
            depth,
            worker_threads,
        })
    }
}

fn parse_depth(raw: &str) -> Result<Depth, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidValue {
            key: DEPTH_VAR,
            value: raw.to_string(),
        })
        .and_then(Depth::try_from)
}

fn parse_workers(raw: &str) -> Result<NonZeroUsize, ConfigError> {
    raw.trim()
        .parse::<NonZeroUsize>()
        .map_err(|_| ConfigError::InvalidValue {
            key: WORKERS_VAR,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<StudioConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StudioConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.depth, Depth::default());
        assert_eq!(config.worker_threads, None);
    }

    #[test]
    fn reads_depth_and_workers() {
        let config = load(&[(DEPTH_VAR, " 6 "), (WORKERS_VAR, "3")]).unwrap();
        assert_eq!(config.depth.get(), 6);
        assert_eq!(config.worker_threads, NonZeroUsize::new(3));
    }

    #[test]
    fn rejects_out_of_range_depth() {
        assert_eq!(
            load(&[(DEPTH_VAR, "9")]),
            Err(ConfigError::DepthOutOfRange { requested: 9 })
        );
        assert_eq!(
            load(&[(DEPTH_VAR, "0")]),
            Err(ConfigError::DepthOutOfRange { requested: 0 })
        );
        assert_eq!(
            load(&[(DEPTH_VAR, "300")]),
            Err(ConfigError::DepthOutOfRange { requested: 300 })
        );
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            load(&[(DEPTH_VAR, "deep")]),
            Err(ConfigError::InvalidValue { key: DEPTH_VAR, .. })
        ));
        assert!(matches!(
            load(&[(WORKERS_VAR, "0")]),
            Err(ConfigError::InvalidValue { key: WORKERS_VAR, .. })
        ));
    }
}
