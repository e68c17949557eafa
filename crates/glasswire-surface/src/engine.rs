//! Rendering engine abstraction.
//!
//! The engine is opaque to the rest of the crate: it can launch a surface
//! showing a page, and a surface can take a still image of itself.

use std::time::Duration;

use async_trait::async_trait;

use glasswire_core::config::SurfaceConfig;

/// Flags every engine instance is launched with.
pub const HARDENED_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Everything an engine needs to bring up one surface.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub viewport: Viewport,
    pub url: String,
    /// Upper bound on launch plus first navigation.
    pub timeout: Duration,
}

impl LaunchOptions {
    /// Options for the shared surface: landing page at the derived viewport.
    pub fn shared(config: &SurfaceConfig) -> Self {
        let (width, height) = config.viewport();
        Self {
            viewport: Viewport { width, height },
            url: config.landing_url.clone(),
            timeout: Duration::from_millis(config.launch_timeout_ms),
        }
    }

    /// Options for a single-shot capture of the snapshot page.
    pub fn snapshot(config: &SurfaceConfig) -> Self {
        Self {
            url: config.snapshot_url.clone(),
            ..Self::shared(config)
        }
    }
}

/// Encoding requested from a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Lossy, `quality` in 0..=100.
    Jpeg { quality: u8 },
    Png,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// A launched rendering target.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Still image of the visible viewport.
    async fn capture(&self, format: ImageFormat) -> anyhow::Result<Vec<u8>>;

    /// Close the surface and the engine instance behind it.
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Launches surfaces.
#[async_trait]
pub trait SurfaceEngine: Send + Sync {
    /// Engine identifier for logs.
    fn name(&self) -> &str;

    /// Start an instance, size it, and navigate to `options.url`.
    async fn launch(&self, options: &LaunchOptions) -> anyhow::Result<Box<dyn Surface>>;
}

/// Stand-in used when the binary is built without a real engine.
pub struct UnavailableEngine;

#[async_trait]
impl SurfaceEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn launch(&self, _options: &LaunchOptions) -> anyhow::Result<Box<dyn Surface>> {
        anyhow::bail!("No rendering engine compiled in; rebuild with the `browser` feature")
    }
}
