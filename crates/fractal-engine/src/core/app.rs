use winit::event::WindowEvent;
use winit::window::WindowId;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract.
pub trait App {
    /// Called for window events, after the runtime has handled resizes.
    ///
    /// No GPU access here; record what should change and apply it in
    /// [`on_frame`](App::on_frame).
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called once per redraw.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;
}
