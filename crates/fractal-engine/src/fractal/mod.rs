//! Hierarchical transform evaluator for a five-way branching fractal.
//!
//! Level `k` holds `5^k` parts in a flat buffer; element `i` hangs off element
//! `i / 5` of level `k - 1`. Each frame the root is placed from an external
//! transform, then levels are updated in order, each one fanned out over a
//! worker pool and joined before the next starts. The resulting instance
//! matrices are handed to an [`InstanceBackend`] with one instanced draw per
//! level.
//!
//! Layout:
//! - `store`: per-level part and matrix buffers
//! - `task`: the per-level parallel update
//! - `driver`: frame orchestration and the worker pool
//! - `sync`: backend hand-off
//! - `lifecycle`: activation, teardown and reconfiguration

mod config;
mod driver;
mod lifecycle;
mod part;
mod store;
mod sync;
mod task;

#[cfg(test)]
mod testing;

pub use config::{level_len, ConfigError, Depth, DrawConfig, FractalConfig};
pub use driver::{spin_delta, FrameDriver, FrameInput, RootTransform, SPIN_SPEED};
pub use lifecycle::Fractal;
pub use part::{parent_index, ChildSlot, InstanceMatrix, Part, BRANCHING};
pub use store::{level_scale, HierarchyStore, Level, LEVEL_SCALE_FACTOR};
pub use sync::{Bounds, BufferSync, DrawInstanced, InstanceBackend};
pub use task::{LevelUpdate, CHILD_OFFSET};
