use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::device::{Gpu, GpuInit};
use crate::time::FrameClock;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,

    /// Template for the window's frame clock (dt clamps); reset on window creation.
    pub clock: FrameClock,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "fractal".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            clock: FrameClock::default(),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window and drives `app` until it exits or the window closes.
    ///
    /// Window and GPU creation failures are returned once the loop unwinds.
    pub fn run<A>(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.startup_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    config: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    entry: Option<WindowEntry>,
    startup_error: Option<anyhow::Error>,
    exit_requested: bool,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            config,
            gpu_init,
            app,
            entry: None,
            startup_error: None,
            exit_requested: false,
        }
    }

    fn create_window_entry(&self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let mut clock = self.config.clock.clone();
        clock.reset();

        WindowEntryTryBuilder {
            clock,
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()
        .context("GPU initialization failed")
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_requested = true;
        // Drop GPU state while the event loop is still alive.
        self.entry = None;
        event_loop.exit();
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() || self.exit_requested {
            return;
        }

        match self.create_window_entry(event_loop) {
            Ok(entry) => {
                entry.with_window(|w| w.request_redraw());
                self.entry = Some(entry);
            }
            Err(e) => {
                log::error!("failed to create window: {e:#}");
                self.startup_error = Some(e);
                self.exit(event_loop);
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        // Continuous redraw; the fractal animates every frame.
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        let Some(entry) = self.entry.as_mut() else {
            return;
        };

        match &event {
            WindowEvent::Resized(new_size) => {
                entry.with_gpu_mut(|gpu| gpu.resize(*new_size));
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = entry.with_window(|w| w.inner_size());
                entry.with_gpu_mut(|gpu| gpu.resize(new_size));
            }
            _ => {}
        }

        if self.app.on_window_event(window_id, &event) == AppControl::Exit {
            self.exit(event_loop);
            return;
        }

        match &event {
            WindowEvent::CloseRequested => self.exit(event_loop),

            WindowEvent::RedrawRequested => {
                let app = &mut self.app;
                let mut control = AppControl::Continue;

                entry.with_mut(|fields| {
                    let size = fields.window.inner_size();
                    if size.width == 0 || size.height == 0 {
                        return;
                    }

                    let mut ctx = FrameCtx {
                        window: WindowCtx {
                            id: window_id,
                            window: fields.window,
                        },
                        gpu: fields.gpu,
                        time: fields.clock.tick(),
                    };
                    control = app.on_frame(&mut ctx);
                });

                if control == AppControl::Exit {
                    self.exit(event_loop);
                }
            }

            _ => {}
        }
    }
}
