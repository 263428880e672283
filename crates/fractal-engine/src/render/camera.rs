use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::fractal::Bounds;

/// Perspective look-at camera with a single directional light.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,

    /// Vertical field of view, radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,

    /// Direction the light travels (from the light towards the scene).
    pub light_dir: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 1.0, 4.5),
            target: Vec3::new(0.0, 0.5, 0.0),
            up: Vec3::Y,
            fov_y: 45f32.to_radians(),
            near: 0.05,
            far: 100.0,
            light_dir: Vec3::new(-0.4, -1.0, -0.6).normalize(),
        }
    }
}

impl Camera {
    /// View-projection matrix (wgpu clip space, depth in `[0, 1]`).
    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye, self.target, self.up);
        let proj = Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), self.near, self.far);
        proj * view
    }

    /// False only if `bounds` lies entirely outside one clip plane.
    ///
    /// Conservative: boxes crossing a frustum corner may be reported visible.
    pub fn sees(&self, bounds: &Bounds, aspect: f32) -> bool {
        let vp = self.view_proj(aspect);
        let clip = bounds.corners().map(|c| vp * c.extend(1.0));

        let outside = |f: fn(&Vec4) -> bool| clip.iter().all(f);
        !(outside(|p| p.x < -p.w)
            || outside(|p| p.x > p.w)
            || outside(|p| p.y < -p.w)
            || outside(|p| p.y > p.w)
            || outside(|p| p.z < 0.0)
            || outside(|p| p.z > p.w))
    }

    pub(super) fn uniform(&self, aspect: f32) -> CameraUniform {
        CameraUniform {
            view_proj: self.view_proj(aspect).to_cols_array_2d(),
            light_dir: self.light_dir.normalize_or_zero().extend(0.0).to_array(),
        }
    }
}

/// Camera uniform (80 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub light_dir: [f32; 4],
}
