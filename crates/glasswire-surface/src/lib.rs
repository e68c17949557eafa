//! Shared rendering surface and its capture feed.
//!
//! One [`SharedSurface`] owns the single long-lived rendering target. The
//! [`CaptureScheduler`] turns it into cadenced multipart JPEG streams, and
//! [`snapshot::single_shot`] takes one PNG from a throwaway instance.
//! The real CDP engine needs the `browser` feature and Chrome/Chromium
//! installed.

pub mod capture;
pub mod engine;
pub mod frame;
pub mod snapshot;
pub mod surface;

#[cfg(feature = "browser")]
pub mod chromium;

#[cfg(test)]
mod fake;

pub use capture::{CaptureScheduler, FrameStream, StreamProfile};
pub use engine::{ImageFormat, LaunchOptions, Surface, SurfaceEngine, Viewport};
pub use frame::Frame;
pub use surface::{SharedSurface, SurfaceError, SurfaceGuard, SurfaceState};
