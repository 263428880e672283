//! Contract between the runtime loop and applications.
//!
//! Applications implement [`App`]; the runtime calls it for window events and
//! once per frame with a [`FrameCtx`].

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, WindowCtx};
