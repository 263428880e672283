use anyhow::Result;
use glam::Vec3;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use fractal_engine::core::{App, AppControl, FrameCtx};
use fractal_engine::fractal::{Depth, DrawConfig, Fractal, FractalConfig, FrameInput, RootTransform};
use fractal_engine::render::{
    Camera, Color, InstanceBuffer, InstancedMeshRenderer, Material, MaterialId, Mesh, MeshId,
};

use crate::config::StudioConfig;

const CLEAR: Color = Color::linear(0.02, 0.02, 0.03, 1.0);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Shape {
    Cube,
    Sphere,
}

impl Shape {
    fn toggled(self) -> Self {
        match self {
            Self::Cube => Self::Sphere,
            Self::Sphere => Self::Cube,
        }
    }
}

/// GPU-side state, created on the first frame.
struct Scene {
    renderer: InstancedMeshRenderer,
    cube: MeshId,
    sphere: MeshId,
    material: MaterialId,
    fractal: Option<Fractal<InstanceBuffer>>,
}

impl Scene {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Self> {
        let mut renderer = InstancedMeshRenderer::new(device, queue);
        renderer.set_camera(Camera {
            eye: Vec3::new(3.5, 2.5, 5.5),
            target: Vec3::new(0.0, 0.9, 0.0),
            ..Camera::default()
        });

        let cube = renderer.add_mesh(&Mesh::cube())?;
        let sphere = renderer.add_mesh(&Mesh::uv_sphere(24, 12))?;
        let material = renderer.add_material(&Material {
            base_color: Color::from_srgb_u8(232, 170, 84, 255),
            ambient: 0.25,
        });

        Ok(Self {
            renderer,
            cube,
            sphere,
            material,
            fractal: None,
        })
    }

    fn draw_config(&self, shape: Shape) -> DrawConfig {
        DrawConfig {
            mesh: match shape {
                Shape::Cube => self.cube,
                Shape::Sphere => self.sphere,
            },
            material: self.material,
        }
    }

    /// Activates or reconfigures the fractal when `wanted` differs from the
    /// active configuration. Returns whether anything changed.
    ///
    /// On error no fractal is active.
    fn apply(&mut self, wanted: FractalConfig) -> Result<bool> {
        let (fractal, changed) = match self.fractal.take() {
            None => (Fractal::activate(wanted, &mut self.renderer)?, true),
            Some(active) if *active.config() == wanted => (active, false),
            Some(active) => (active.reconfigure(wanted, &mut self.renderer)?, true),
        };
        self.fractal = Some(fractal);
        Ok(changed)
    }

    fn shutdown(&mut self) {
        if let Some(fractal) = self.fractal.take() {
            fractal.deactivate(&mut self.renderer);
        }
    }
}

impl Drop for Scene {
    // Covers exits that skip `Studio::shutdown`, e.g. the event loop ending.
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Demo app: one fractal at the origin, reconfigurable from the keyboard.
pub struct Studio {
    config: StudioConfig,

    /// Requested state; applied at the start of the next frame.
    depth: Depth,
    shape: Shape,

    scene: Option<Scene>,
}

impl Studio {
    pub fn new(config: StudioConfig) -> Self {
        Self {
            depth: config.depth,
            shape: Shape::Cube,
            config,
            scene: None,
        }
    }

    pub fn title(depth: Depth) -> String {
        format!("Fractal Studio (depth {depth})")
    }

    fn on_key(&mut self, event: &KeyEvent) -> AppControl {
        if event.state != ElementState::Pressed || event.repeat {
            return AppControl::Continue;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return AppControl::Continue;
        };

        match code {
            KeyCode::Escape => return AppControl::Exit,
            KeyCode::KeyM => {
                self.shape = self.shape.toggled();
                log::info!("mesh change requested: {:?}", self.shape);
            }
            code => {
                if let Some(n) = digit(code) {
                    self.request_depth(n);
                }
            }
        }
        AppControl::Continue
    }

    fn request_depth(&mut self, levels: u8) {
        match Depth::new(levels) {
            Ok(depth) => {
                log::info!("depth change requested: {depth}");
                self.depth = depth;
            }
            Err(err) => log::warn!("ignoring depth request: {err}"),
        }
    }

    fn shutdown(&mut self) {
        if let Some(scene) = self.scene.as_mut() {
            scene.shutdown();
        }
    }
}

impl App for Studio {
    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        let control = match event {
            WindowEvent::KeyboardInput { event, .. } => self.on_key(event),
            WindowEvent::CloseRequested => AppControl::Exit,
            _ => AppControl::Continue,
        };
        if control == AppControl::Exit {
            self.shutdown();
        }
        control
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.scene.is_none() {
            match Scene::new(ctx.gpu.device(), ctx.gpu.queue()) {
                Ok(scene) => self.scene = Some(scene),
                Err(err) => {
                    log::error!("failed to set up scene: {err:#}");
                    return AppControl::Exit;
                }
            }
        }
        let Some(scene) = self.scene.as_mut() else {
            return AppControl::Exit;
        };

        let wanted = FractalConfig::new(self.depth, scene.draw_config(self.shape))
            .with_worker_threads(self.config.worker_threads);
        match scene.apply(wanted) {
            Ok(true) => ctx.window.set_title(&Self::title(self.depth)),
            Ok(false) => {}
            Err(err) => {
                log::error!("failed to activate fractal: {err:#}");
                return AppControl::Exit;
            }
        }

        let input = FrameInput {
            dt: ctx.time.dt,
            root: RootTransform::default(),
        };
        if let Some(fractal) = scene.fractal.as_mut() {
            fractal.frame(&input, &mut scene.renderer);
        }

        let renderer = &mut scene.renderer;
        let control = ctx.render(CLEAR, |rctx, target| renderer.render(rctx, target));
        if control == AppControl::Exit {
            scene.shutdown();
        }
        control
    }
}

fn digit(code: KeyCode) -> Option<u8> {
    Some(match code {
        KeyCode::Digit1 => 1,
        KeyCode::Digit2 => 2,
        KeyCode::Digit3 => 3,
        KeyCode::Digit4 => 4,
        KeyCode::Digit5 => 5,
        KeyCode::Digit6 => 6,
        KeyCode::Digit7 => 7,
        KeyCode::Digit8 => 8,
        KeyCode::Digit9 => 9,
        _ => return None,
    })
}
