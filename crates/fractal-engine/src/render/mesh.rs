use std::f32::consts::{PI, TAU};

use bytemuck::{Pod, Zeroable};

/// Handle to a mesh registered with [`InstancedMeshRenderer`](super::InstancedMeshRenderer).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MeshId(pub u32);

/// Vertex layout (24 bytes):
///
///  offset  0  position [f32; 3]   loc 0
///  offset 12  normal   [f32; 3]   loc 1
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl MeshVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x3, // position
        1 => Float32x3  // normal
    ];

    pub(super) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// CPU-side indexed triangle mesh, counter-clockwise front faces.
///
/// The built-in shapes fit the unit cube centered at the origin, which is what
/// the fractal's culling bounds assume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

impl Mesh {
    /// Unit cube (edge 1) with flat per-face normals.
    pub fn cube() -> Self {
        // (normal, tangent u, tangent v) per face, with u x v == normal.
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ];

        let mut mesh = Self::default();
        for (n, u, v) in FACES {
            let base = mesh.vertices.len() as u16;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = [
                    0.5 * n[0] + su * u[0] + sv * v[0],
                    0.5 * n[1] + su * u[1] + sv * v[1],
                    0.5 * n[2] + su * u[2] + sv * v[2],
                ];
                mesh.vertices.push(MeshVertex { position, normal: n });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// UV sphere of radius 0.5 with smooth normals.
    ///
    /// `segments` is clamped to `[3, 128]` and `rings` to `[2, 64]` so the vertex
    /// count always fits `u16` indices.
    pub fn uv_sphere(segments: u16, rings: u16) -> Self {
        let segments = segments.clamp(3, 128);
        let rings = rings.clamp(2, 64);

        let mut mesh = Self::default();
        for r in 0..=rings {
            let theta = PI * f32::from(r) / f32::from(rings);
            let (sin_t, cos_t) = theta.sin_cos();
            for s in 0..=segments {
                let phi = TAU * f32::from(s) / f32::from(segments);
                let (sin_p, cos_p) = phi.sin_cos();
                let normal = [sin_t * cos_p, cos_t, sin_t * sin_p];
                mesh.vertices.push(MeshVertex {
                    position: normal.map(|c| 0.5 * c),
                    normal,
                });
            }
        }

        let stride = segments + 1;
        for r in 0..rings {
            for s in 0..segments {
                let a = r * stride + s;
                let b = a + stride;
                mesh.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        mesh
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}
