use anyhow::Result;
use glam::Vec3;

use crate::render::{MaterialId, MeshId};

use super::config::DrawConfig;
use super::part::InstanceMatrix;
use super::store::HierarchyStore;
use super::task::CHILD_OFFSET;

/// Axis-aligned culling volume.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Bounds {
    /// Box around a root at `center` with world scale `scale`.
    ///
    /// A level-`k` part lies within `1.5 * scale * (1 - 0.5^k)` of the root and a
    /// unit mesh adds at most `0.5 * scale * 0.5^k`, so every descendant fits in a
    /// box of edge `3 * scale`.
    pub fn for_root(center: Vec3, scale: f32) -> Self {
        Self {
            center,
            half_extents: Vec3::splat(CHILD_OFFSET * scale),
        }
    }

    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    /// The eight corners, in no particular order.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min(), self.max());
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        let (lo, hi) = (self.min(), self.max());
        p.cmpge(lo).all() && p.cmple(hi).all()
    }
}

/// One instanced draw request.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawInstanced {
    pub level: usize,
    pub mesh: MeshId,
    pub material: MaterialId,
    pub instance_count: u32,
    pub bounds: Bounds,
}

/// Rendering backend that receives instance matrices and draw requests.
///
/// Buffers are created once per activation and written once per frame. The
/// hierarchy never reads them back.
pub trait InstanceBackend {
    /// Backend-owned GPU buffer holding one level's matrices.
    type Buffer;

    /// Creates a buffer for `len` instance matrices of level `level`.
    fn create_instance_buffer(&mut self, level: usize, len: usize) -> Result<Self::Buffer>;

    /// Replaces the buffer contents. `matrices.len()` equals the buffer's length.
    fn upload_instances(&mut self, buffer: &Self::Buffer, matrices: &[InstanceMatrix]);

    /// Requests one instanced draw reading from `buffer`.
    fn draw_instanced(&mut self, buffer: &Self::Buffer, draw: &DrawInstanced);

    /// Frees a buffer created by this backend.
    fn release_instance_buffer(&mut self, buffer: Self::Buffer);
}

/// Hands every level's matrices to the backend and issues one draw per level.
#[derive(Debug, Copy, Clone)]
pub struct BufferSync<'a> {
    pub draw: &'a DrawConfig,
    pub bounds: Bounds,
}

impl BufferSync<'_> {
    pub fn submit<B>(&self, store: &HierarchyStore, buffers: &[B::Buffer], backend: &mut B)
    where
        B: InstanceBackend + ?Sized,
    {
        debug_assert_eq!(buffers.len(), store.depth());

        for (k, (level, buffer)) in store.levels().iter().zip(buffers).enumerate() {
            let instance_count =
                u32::try_from(level.len()).expect("level length is bounded by Depth::MAX");

            backend.upload_instances(buffer, level.matrices());
            backend.draw_instanced(
                buffer,
                &DrawInstanced {
                    level: k,
                    mesh: self.draw.mesh,
                    material: self.draw.material,
                    instance_count,
                    bounds: self.bounds,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fractal::config::Depth;
    use crate::fractal::testing::{BackendEvent, RecordingBackend};

    fn draw_config() -> DrawConfig {
        DrawConfig { mesh: MeshId(1), material: MaterialId(2) }
    }

    // ── bounds ────────────────────────────────────────────────────────────

    #[test]
    fn root_bounds_edge_is_three_times_scale() {
        let b = Bounds::for_root(Vec3::new(1.0, 0.0, 0.0), 2.0);
        assert_eq!(b.max() - b.min(), Vec3::splat(6.0));
        assert!(b.contains(Vec3::new(3.9, 2.9, -2.9)));
        assert!(!b.contains(Vec3::new(4.1, 0.0, 0.0)));
    }

    #[test]
    fn corners_span_box() {
        let b = Bounds::for_root(Vec3::ZERO, 1.0);
        let corners = b.corners();
        assert!(corners.iter().all(|&c| b.contains(c)));
        assert!(corners.contains(&Vec3::splat(1.5)));
        assert!(corners.contains(&Vec3::splat(-1.5)));
    }

    // ── submission ────────────────────────────────────────────────────────

    #[test]
    fn uploads_then_draws_each_level() {
        let mut store = HierarchyStore::allocate(Depth::new(3).unwrap()).unwrap();
        store.initialize_child_bindings();

        let mut backend = RecordingBackend::default();
        let buffers: Vec<_> = (0..3)
            .map(|k| backend.create_instance_buffer(k, 5usize.pow(k as u32)).unwrap())
            .collect();
        backend.events.clear();

        let draw = draw_config();
        let sync = BufferSync { draw: &draw, bounds: Bounds::for_root(Vec3::ZERO, 1.0) };
        sync.submit(&store, &buffers, &mut backend);

        assert_eq!(
            backend.events,
            vec![
                BackendEvent::Upload { buffer: 0, len: 1 },
                BackendEvent::Draw { buffer: 0, level: 0, instances: 1 },
                BackendEvent::Upload { buffer: 1, len: 5 },
                BackendEvent::Draw { buffer: 1, level: 1, instances: 5 },
                BackendEvent::Upload { buffer: 2, len: 25 },
                BackendEvent::Draw { buffer: 2, level: 2, instances: 25 },
            ]
        );
        assert!(backend.draws.iter().all(|d| d.mesh == MeshId(1) && d.material == MaterialId(2)));
    }
}
