use std::fmt;
use std::num::NonZeroUsize;

use crate::render::{MaterialId, MeshId};

/// Number of levels in the hierarchy, validated to `[Depth::MIN, Depth::MAX]`.
///
/// Level `k` holds `5^k` parts, so the upper bound keeps the deepest level at
/// 78 125 instances; every level's instance count fits a `u32`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Depth(u8);

impl Depth {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 8;

    pub fn new(levels: u8) -> Result<Self, ConfigError> {
        if (Self::MIN..=Self::MAX).contains(&levels) {
            Ok(Self(levels))
        } else {
            Err(ConfigError::DepthOutOfRange { requested: u32::from(levels) })
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Number of levels as an index bound.
    #[inline]
    pub const fn levels(self) -> usize {
        self.0 as usize
    }

    /// Total number of parts across all levels: `(5^depth - 1) / 4`.
    pub fn total_parts(self) -> usize {
        (0..self.levels()).map(level_len).sum()
    }
}

impl Default for Depth {
    fn default() -> Self {
        Self(4)
    }
}

impl TryFrom<u8> for Depth {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<u32> for Depth {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| ConfigError::DepthOutOfRange { requested: value })
            .and_then(Self::new)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of parts in level `level`.
#[inline]
pub fn level_len(level: usize) -> usize {
    5usize.pow(level as u32)
}

/// Rejected configuration value.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConfigError {
    DepthOutOfRange { requested: u32 },
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthOutOfRange { requested } => write!(
                f,
                "depth {requested} is outside the admissible range [{}, {}]",
                Depth::MIN,
                Depth::MAX
            ),
            Self::InvalidValue { key, value } => write!(f, "invalid value for {key}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Mesh + material handles used for every level's instanced draw.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawConfig {
    pub mesh: MeshId,
    pub material: MaterialId,
}

/// Activation-time configuration.
///
/// Changing any field on an active fractal requires a full rebuild
/// (see [`Fractal::reconfigure`](super::Fractal::reconfigure)).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FractalConfig {
    pub depth: Depth,
    pub draw: DrawConfig,

    /// Size of the fan-out pool. `None` lets rayon pick (one per logical CPU).
    pub worker_threads: Option<NonZeroUsize>,
}

impl FractalConfig {
    pub fn new(depth: Depth, draw: DrawConfig) -> Self {
        Self {
            depth,
            draw,
            worker_threads: None,
        }
    }

    pub fn with_worker_threads(mut self, threads: Option<NonZeroUsize>) -> Self {
        self.worker_threads = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_accepts_admissible_range() {
        for d in 1..=8u8 {
            assert_eq!(Depth::new(d).map(Depth::get), Ok(d));
        }
    }

    #[test]
    fn depth_rejects_zero_and_nine() {
        assert_eq!(Depth::new(0), Err(ConfigError::DepthOutOfRange { requested: 0 }));
        assert_eq!(Depth::new(9), Err(ConfigError::DepthOutOfRange { requested: 9 }));
    }

    #[test]
    fn depth_try_from_u32_rejects_large_values() {
        assert!(Depth::try_from(300u32).is_err());
        assert_eq!(Depth::try_from(3u32).map(Depth::get), Ok(3));
    }

    #[test]
    fn deepest_level_count_fits_u32() {
        let deepest = Depth::new(Depth::MAX).unwrap().levels() - 1;
        assert_eq!(u32::try_from(level_len(deepest)), Ok(78_125));
    }

    #[test]
    fn total_parts_is_geometric_sum() {
        let d = Depth::new(3).unwrap();
        assert_eq!(d.total_parts(), 1 + 5 + 25);
        let d = Depth::new(8).unwrap();
        assert_eq!(d.total_parts(), (5usize.pow(8) - 1) / 4);
    }

    #[test]
    fn error_message_names_range() {
        let msg = Depth::new(9).unwrap_err().to_string();
        assert!(msg.contains("[1, 8]"), "{msg}");
    }
}
