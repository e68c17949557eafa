//! Cadenced frame streams over the shared surface.
//!
//! Each stream loops: lock the surface, capture, unlock, wait out the rest
//! of the frame period. Streams never queue a backlog; when captures get
//! slow (or several streams contend for the lock) every subscriber just
//! sees a lower frame rate.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use glasswire_core::config::{CaptureConfig, MIN_CAPTURE_FPS, ProfileConfig};

use crate::engine::ImageFormat;
use crate::frame::Frame;
use crate::surface::SharedSurface;

pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send>>;

/// Target cadence and JPEG quality of one stream flavor.
#[derive(Debug, Clone)]
pub struct StreamProfile {
    pub name: String,
    pub target_fps: f64,
    pub quality: u8,
}

impl StreamProfile {
    pub fn new(name: impl Into<String>, target_fps: f64, quality: u8) -> Self {
        Self {
            name: name.into(),
            target_fps,
            quality: quality.min(100),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &ProfileConfig) -> Self {
        Self::new(name, config.fps, config.quality)
    }

    /// Minimum spacing between two captures of this stream, capped at the
    /// period of [`MIN_CAPTURE_FPS`].
    pub fn period(&self) -> Duration {
        if !(self.target_fps > 0.0) {
            return Duration::ZERO;
        }
        let longest = Duration::from_secs_f64(1.0 / MIN_CAPTURE_FPS);
        Duration::try_from_secs_f64(1.0 / self.target_fps)
            .map_or(longest, |period| period.min(longest))
    }
}

/// Hands out frame streams that all share one surface.
pub struct CaptureScheduler {
    surface: Arc<SharedSurface>,
    log_every: u64,
}

impl CaptureScheduler {
    pub fn new(surface: Arc<SharedSurface>, config: &CaptureConfig) -> Self {
        Self {
            surface,
            log_every: config.log_every_frames,
        }
    }

    pub fn surface(&self) -> &Arc<SharedSurface> {
        &self.surface
    }

    /// Open a lazy, unbounded frame stream.
    ///
    /// The stream ends on a capture fault (after tearing the surface down)
    /// or when the surface cannot be brought up. Dropping it cancels it.
    pub fn open_stream(&self, profile: StreamProfile) -> FrameStream {
        debug!(profile = %profile.name, fps = profile.target_fps, quality = profile.quality, "Opening frame stream");
        let state = StreamState {
            surface: self.surface.clone(),
            period: profile.period(),
            format: ImageFormat::Jpeg {
                quality: profile.quality,
            },
            profile,
            log_every: self.log_every,
            last_start: None,
            opened_at: Instant::now(),
            frames: 0,
        };

        Box::pin(futures::stream::unfold(state, |mut state| async move {
            state.pace().await;
            let frame = state.capture_one().await?;
            Some((frame, state))
        }))
    }
}

struct StreamState {
    surface: Arc<SharedSurface>,
    profile: StreamProfile,
    period: Duration,
    format: ImageFormat,
    log_every: u64,
    last_start: Option<Instant>,
    opened_at: Instant,
    frames: u64,
}

impl StreamState {
    /// Sleep whatever is left of the period since the previous capture began.
    async fn pace(&self) {
        if let Some(previous) = self.last_start {
            let elapsed = previous.elapsed();
            if elapsed < self.period {
                tokio::time::sleep(self.period - elapsed).await;
            }
        }
    }

    async fn capture_one(&mut self) -> Option<Frame> {
        self.last_start = Some(Instant::now());

        let guard = match self.surface.acquire().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(profile = %self.profile.name, %e, "Frame stream ending: surface unavailable");
                return None;
            }
        };

        let data = match guard.capture(self.format).await {
            Ok(data) => data,
            Err(e) => {
                error!(profile = %self.profile.name, %e, "Capture failed, tearing down surface");
                guard.teardown().await;
                return None;
            }
        };
        drop(guard);

        self.frames += 1;
        if self.log_every > 0 && self.frames % self.log_every == 0 {
            let secs = self.opened_at.elapsed().as_secs_f64();
            if secs > 0.0 {
                info!(
                    profile = %self.profile.name,
                    frames = self.frames,
                    "Average FPS: {:.1}",
                    self.frames as f64 / secs
                );
            }
        }

        Some(Frame {
            seq: self.frames,
            content_type: self.format.content_type(),
            data: Bytes::from(data),
        })
    }
}
