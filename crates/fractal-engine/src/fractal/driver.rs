use std::f32::consts::PI;
use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};

use super::part::{InstanceMatrix, Part};
use super::store::{level_scale, HierarchyStore};
use super::task::{compose_rotation, LevelUpdate};

/// Spin speed in radians per second.
pub const SPIN_SPEED: f32 = 0.125 * PI;

/// Spin added to every part for a frame of `dt` seconds.
#[inline]
pub fn spin_delta(dt: f32) -> f32 {
    SPIN_SPEED * dt
}

/// World transform of the object the fractal is attached to.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RootTransform {
    pub position: Vec3,
    pub rotation: Quat,

    /// Uniform world scale of the object.
    pub scale: f32,
}

impl Default for RootTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

/// External inputs for one frame.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct FrameInput {
    /// Seconds since the previous frame.
    pub dt: f32,
    pub root: RootTransform,
}

/// Runs one frame of the hierarchy: root first, then every level in order.
///
/// Each level fans out over the driver's worker pool. A level starts only after
/// the previous level's fan-out has joined, since it reads the world transforms
/// written there during the same frame.
pub struct FrameDriver {
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for FrameDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl FrameDriver {
    /// Builds the worker pool. `None` uses one thread per logical CPU.
    pub fn new(threads: Option<NonZeroUsize>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.map_or(0, NonZeroUsize::get))
            .thread_name(|i| format!("fractal-worker-{i}"))
            .build()
            .context("failed to build fractal worker pool")?;

        log::debug!("fractal worker pool: {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    #[inline]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Advances every level of `store` by one frame.
    ///
    /// Blocks until the deepest level is complete; afterwards every matrix in the
    /// store reflects this frame.
    pub fn run_frame(&self, store: &mut HierarchyStore, input: &FrameInput) {
        let delta = spin_delta(input.dt);

        let (root, root_matrix) = store.root_mut();
        *root_matrix = update_root(root, &input.root, delta);

        for k in 1..store.depth() {
            let update = LevelUpdate {
                spin_delta: delta,
                scale: level_scale(input.root.scale, k),
            };
            let (parent, level) = store.parent_and_level_mut(k);
            let (parts, matrices) = level.buffers_mut();

            // `install` returns only after the whole fan-out has joined.
            self.pool.install(|| update.run(parent.parts(), parts, matrices));
        }

        log::trace!("frame updated: {} levels, dt {:.4}", store.depth(), input.dt);
    }
}

/// Updates the root from the external transform, which stands in for a parent.
fn update_root(
    root: &mut Part,
    transform: &RootTransform,
    delta: f32,
) -> InstanceMatrix {
    root.spin_angle += delta;
    root.world_rotation = compose_rotation(transform.rotation, root);
    root.world_position = transform.position;

    InstanceMatrix::from_rotation_scale_translation(
        root.world_rotation,
        transform.scale,
        root.world_position,
    )
}
