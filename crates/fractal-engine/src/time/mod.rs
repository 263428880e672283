//! Frame timing.
//!
//! One `FrameClock` per window; `tick()` once per presented frame. The clamped
//! `dt` is what the fractal's spin advances by.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
