use anyhow::{Context, Result};

use super::config::FractalConfig;
use super::driver::{FrameDriver, FrameInput};
use super::store::HierarchyStore;
use super::sync::{Bounds, BufferSync, InstanceBackend};

/// An active fractal: level buffers, GPU instance buffers and the worker pool.
///
/// A `Fractal` only exists between [`activate`](Self::activate) and
/// [`deactivate`](Self::deactivate), so frames can only be run on a fully built
/// hierarchy. Changing depth, mesh or material goes through
/// [`reconfigure`](Self::reconfigure), which tears everything down and rebuilds.
///
/// `G` is the backend's buffer type. Always end with
/// [`deactivate`](Self::deactivate) or [`reconfigure`](Self::reconfigure): the
/// backend is not reachable from `Drop`, so a plain drop frees the buffers
/// (GPU before CPU, by field order) without
/// [`InstanceBackend::release_instance_buffer`] ever seeing them.
pub struct Fractal<G> {
    gpu_buffers: Vec<G>,
    store: HierarchyStore,
    driver: FrameDriver,
    config: FractalConfig,
    bounds: Bounds,
}

impl<G> Fractal<G> {
    /// Allocates all levels, binds child slots and creates one GPU buffer per level.
    ///
    /// Any allocation failure is returned as-is after releasing the GPU buffers
    /// created so far.
    pub fn activate<B>(config: FractalConfig, backend: &mut B) -> Result<Self>
    where
        B: InstanceBackend<Buffer = G> + ?Sized,
    {
        let driver = FrameDriver::new(config.worker_threads)?;
        Self::build(config, driver, backend)
    }

    fn build<B>(config: FractalConfig, driver: FrameDriver, backend: &mut B) -> Result<Self>
    where
        B: InstanceBackend<Buffer = G> + ?Sized,
    {
        let mut store = HierarchyStore::allocate(config.depth)
            .with_context(|| format!("failed to allocate depth-{} hierarchy", config.depth))?;
        store.initialize_child_bindings();

        let mut gpu_buffers = Vec::with_capacity(store.depth());
        for (k, level) in store.levels().iter().enumerate() {
            match backend.create_instance_buffer(k, level.len()) {
                Ok(buffer) => gpu_buffers.push(buffer),
                Err(err) => {
                    release_gpu_buffers(gpu_buffers, backend);
                    store.release();
                    return Err(err.context(format!("failed to create instance buffer for level {k}")));
                }
            }
        }

        log::info!(
            "fractal activated: depth {}, {} parts, {} worker threads",
            config.depth,
            store.total_parts(),
            driver.threads()
        );

        Ok(Self {
            gpu_buffers,
            store,
            driver,
            config,
            bounds: Bounds::for_root(glam::Vec3::ZERO, 1.0),
        })
    }

    /// Releases GPU buffers, then CPU levels.
    pub fn deactivate<B>(self, backend: &mut B)
    where
        B: InstanceBackend<Buffer = G> + ?Sized,
    {
        let depth = self.config.depth;
        self.teardown(backend);
        log::info!("fractal deactivated: depth {depth}");
    }

    fn teardown<B>(self, backend: &mut B) -> FrameDriver
    where
        B: InstanceBackend<Buffer = G> + ?Sized,
    {
        let Self { gpu_buffers, store, driver, .. } = self;
        release_gpu_buffers(gpu_buffers, backend);
        store.release();
        driver
    }

    /// Full deactivate/activate cycle with `config`. No state carries over; spin
    /// restarts from zero.
    ///
    /// The worker pool is kept when the thread count is unchanged.
    pub fn reconfigure<B>(self, config: FractalConfig, backend: &mut B) -> Result<Self>
    where
        B: InstanceBackend<Buffer = G> + ?Sized,
    {
        log::info!("reconfiguring fractal: depth {} -> {}", self.config.depth, config.depth);

        let same_pool = self.config.worker_threads == config.worker_threads;
        let driver = self.teardown(backend);
        let driver = if same_pool {
            driver
        } else {
            drop(driver);
            FrameDriver::new(config.worker_threads)?
        };

        Self::build(config, driver, backend)
    }

    /// Advances every level by one frame. Returns once all levels are complete.
    pub fn update(&mut self, input: &FrameInput) {
        self.driver.run_frame(&mut self.store, input);
        self.bounds = Bounds::for_root(self.store.root().world_position, input.root.scale);
    }

    /// Uploads every level's matrices and requests one instanced draw per level.
    pub fn draw<B>(&self, backend: &mut B)
    where
        B: InstanceBackend<Buffer = G> + ?Sized,
    {
        BufferSync { draw: &self.config.draw, bounds: self.bounds }.submit(
            &self.store,
            &self.gpu_buffers,
            backend,
        );
    }

    /// [`update`](Self::update) followed by [`draw`](Self::draw).
    pub fn frame<B>(&mut self, input: &FrameInput, backend: &mut B)
    where
        B: InstanceBackend<Buffer = G> + ?Sized,
    {
        self.update(input);
        self.draw(backend);
    }

    #[inline]
    pub fn config(&self) -> &FractalConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &HierarchyStore {
        &self.store
    }

    /// Culling volume from the last update.
    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }
}

impl<G> std::fmt::Debug for Fractal<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fractal")
            .field("config", &self.config)
            .field("levels", &self.store.depth())
            .field("gpu_buffers", &self.gpu_buffers.len())
            .field("driver", &self.driver)
            .finish()
    }
}

/// Releases in reverse creation order.
fn release_gpu_buffers<B>(buffers: Vec<B::Buffer>, backend: &mut B)
where
    B: InstanceBackend + ?Sized,
{
    for buffer in buffers.into_iter().rev() {
        backend.release_instance_buffer(buffer);
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use glam::Vec3;

    use super::*;
    use crate::fractal::config::{Depth, DrawConfig};
    use crate::fractal::driver::RootTransform;
    use crate::fractal::testing::{BackendEvent, RecordedBuffer, RecordingBackend};
    use crate::render::{MaterialId, MeshId};

    fn config(depth: u8) -> FractalConfig {
        FractalConfig::new(
            Depth::new(depth).unwrap(),
            DrawConfig { mesh: MeshId(0), material: MaterialId(0) },
        )
        .with_worker_threads(NonZeroUsize::new(2))
    }

    fn activate(depth: u8, backend: &mut RecordingBackend) -> Fractal<RecordedBuffer> {
        Fractal::activate(config(depth), backend).unwrap()
    }

    // ── activation ────────────────────────────────────────────────────────

    #[test]
    fn activation_creates_one_buffer_per_level() {
        let mut backend = RecordingBackend::default();
        let fractal = activate(4, &mut backend);

        assert_eq!(backend.live, 4);
        let sizes: Vec<(usize, usize)> = backend
            .events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Create { level, len, .. } => Some((*level, *len)),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![(0, 1), (1, 5), (2, 25), (3, 125)]);
        assert_eq!(fractal.store().depth(), 4);
    }

    #[test]
    fn failed_activation_releases_created_buffers() {
        let mut backend = RecordingBackend::failing_at(2);
        let err = Fractal::activate(config(4), &mut backend).unwrap_err();

        assert!(format!("{err:#}").contains("level 2"), "{err:#}");
        assert_eq!(backend.live, 0);
        assert_eq!(backend.released(), vec![1, 0]);
    }

    // ── deactivation ──────────────────────────────────────────────────────

    #[test]
    fn deactivation_releases_every_buffer_in_reverse() {
        let mut backend = RecordingBackend::default();
        activate(3, &mut backend).deactivate(&mut backend);

        assert_eq!(backend.live, 0);
        assert_eq!(backend.created(), vec![0, 1, 2]);
        assert_eq!(backend.released(), vec![2, 1, 0]);
    }

    #[test]
    fn plain_drop_bypasses_backend_release() {
        let mut backend = RecordingBackend::default();
        drop(activate(2, &mut backend));

        assert!(backend.released().is_empty());
        assert_eq!(backend.live, 2);
    }

    // ── reconfiguration ───────────────────────────────────────────────────

    #[test]
    fn reconfigure_rebuilds_from_scratch() {
        let mut backend = RecordingBackend::default();
        let mut fractal = activate(3, &mut backend);
        for _ in 0..5 {
            fractal.update(&FrameInput { dt: 0.1, root: RootTransform::default() });
        }

        let fractal = fractal.reconfigure(config(5), &mut backend).unwrap();

        assert_eq!(fractal.store().depth(), 5);
        assert_eq!(backend.live, 5);
        // Old buffers go before any new one is created.
        let first_new = backend
            .events
            .iter()
            .position(|e| matches!(e, BackendEvent::Create { buffer: 3, .. }))
            .unwrap();
        let last_release = backend
            .events
            .iter()
            .rposition(|e| matches!(e, BackendEvent::Release { .. }))
            .unwrap();
        assert!(last_release < first_new);
        assert!(fractal
            .store()
            .levels()
            .iter()
            .flat_map(|l| l.parts())
            .all(|p| p.spin_angle == 0.0));
    }

    #[test]
    fn reactivation_reproduces_initial_state() {
        let mut backend = RecordingBackend::default();
        let a = activate(3, &mut backend);
        let snapshot: Vec<_> = a.store().levels().iter().map(|l| l.parts().to_vec()).collect();
        a.deactivate(&mut backend);

        let b = activate(3, &mut backend);
        let again: Vec<_> = b.store().levels().iter().map(|l| l.parts().to_vec()).collect();
        assert_eq!(snapshot, again);
    }

    // ── frames ────────────────────────────────────────────────────────────

    #[test]
    fn frame_uploads_current_matrices() {
        let mut backend = RecordingBackend::default();
        let mut fractal = activate(3, &mut backend);
        let root = RootTransform { position: Vec3::new(0.0, 2.0, 0.0), ..RootTransform::default() };
        fractal.frame(&FrameInput { dt: 0.05, root }, &mut backend);

        for (k, level) in fractal.store().levels().iter().enumerate() {
            assert_eq!(backend.contents[k].as_slice(), level.matrices());
        }
        assert_eq!(backend.draws.len(), 3);
        assert_eq!(fractal.bounds(), Bounds::for_root(root.position, 1.0));
        assert!(backend.draws.iter().all(|d| d.bounds == fractal.bounds()));
        assert_eq!(
            backend.draws.iter().map(|d| d.instance_count).collect::<Vec<_>>(),
            vec![1, 5, 25]
        );
    }

    #[test]
    fn out_of_range_depth_never_reaches_allocation() {
        assert!(Depth::new(9).is_err());
        assert!(Depth::try_from(9u32).is_err());
    }
}
