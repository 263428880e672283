use winit::window::{Window, WindowId};

use crate::device::{Gpu, SurfaceErrorAction};
use crate::render::{Color, RenderCtx, RenderTarget};
use crate::time::FrameTime;

use super::app::AppControl;

/// Per-window handles.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
///
/// `'a` is the callback duration; `'w` is the window borrow carried by `Gpu<'w>`.
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut Gpu<'w>,
    pub time: FrameTime,
}

impl FrameCtx<'_, '_> {
    /// Clears the surface to `clear`, calls `draw` with a ready [`RenderCtx`]
    /// and [`RenderTarget`], then presents.
    ///
    /// Surface loss is handled here; only an unrecoverable surface error
    /// returns [`AppControl::Exit`].
    pub fn render<F>(&mut self, clear: Color, draw: F) -> AppControl
    where
        F: FnOnce(&RenderCtx<'_>, &mut RenderTarget<'_>),
    {
        let mut frame = match self.gpu.begin_frame() {
            Ok(f) => f,
            Err(err) => {
                log::debug!("surface texture unavailable: {err}");
                return match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => {
                        log::error!("surface out of memory");
                        AppControl::Exit
                    }
                    _ => AppControl::Continue,
                };
            }
        };

        // Dropped before the encoder moves into submit().
        {
            let _rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("fractal clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        let size = self.gpu.size();
        let rctx = RenderCtx::new(
            self.gpu.device(),
            self.gpu.queue(),
            self.gpu.surface_format(),
            size.width,
            size.height,
        );

        {
            let mut target = RenderTarget::new(&mut frame.encoder, &frame.view);
            draw(&rctx, &mut target);
        }

        self.window.window.pre_present_notify();
        self.gpu.submit(frame);

        AppControl::Continue
    }
}
