//! GPU rendering subsystem.
//!
//! `InstancedMeshRenderer` is the wgpu implementation of
//! [`InstanceBackend`](crate::fractal::InstanceBackend): it owns meshes,
//! materials, the camera uniform and the per-level instance buffers, and records
//! the queued instanced draws into one depth-tested pass per frame.
//!
//! Convention:
//! - world space is right-handed, +Y up
//! - instance transforms are column-major 3x4 (see `fractal::InstanceMatrix`)

mod camera;
mod ctx;
mod instanced;
mod material;
mod mesh;
mod queue;

pub use camera::Camera;
pub use ctx::{RenderCtx, RenderTarget};
pub use instanced::{InstanceBuffer, InstancedMeshRenderer};
pub use material::{Color, Material, MaterialId};
pub use mesh::{Mesh, MeshId, MeshVertex};
