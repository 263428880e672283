use bytemuck::{Pod, Zeroable};

/// Handle to a material registered with [`InstancedMeshRenderer`](super::InstancedMeshRenderer).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MaterialId(pub u32);

/// Linear RGBA color, straight alpha.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::linear(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::linear(1.0, 1.0, 1.0, 1.0);

    #[inline]
    pub const fn linear(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a linear color from sRGB-encoded bytes (alpha is linear).
    pub fn from_srgb_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: srgb_to_linear(f32::from(r) / 255.0),
            g: srgb_to_linear(f32::from(g) / 255.0),
            b: srgb_to_linear(f32::from(b) / 255.0),
            a: f32::from(a) / 255.0,
        }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    #[inline]
    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: f64::from(self.r),
            g: f64::from(self.g),
            b: f64::from(self.b),
            a: f64::from(self.a),
        }
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Surface description for instanced meshes: flat base color with a
/// Lambert term over an ambient floor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Material {
    pub base_color: Color,

    /// Fraction of `base_color` visible on faces turned away from the light.
    /// Clamped to `[0, 1]` on upload.
    pub ambient: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Color::WHITE,
            ambient: 0.2,
        }
    }
}

/// Material uniform (32 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct MaterialUniform {
    pub color: [f32; 4],
    pub params: [f32; 4], // .x = ambient
}

impl From<&Material> for MaterialUniform {
    fn from(m: &Material) -> Self {
        Self {
            color: m.base_color.to_array(),
            params: [m.ambient.clamp(0.0, 1.0), 0.0, 0.0, 0.0],
        }
    }
}
