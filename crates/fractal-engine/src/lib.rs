//! Fractal engine crate.
//!
//! `fractal` is the CPU side: the per-level hierarchy, its parallel update and
//! the lifecycle around it. Everything else is the platform + GPU runtime that
//! puts it on screen: `device` and `window` own wgpu and winit, `render` draws
//! instanced meshes, `core` is the app contract.

pub mod core;
pub mod device;
pub mod fractal;
pub mod logging;
pub mod render;
pub mod time;
pub mod window;
