//! In-memory engine for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::{ImageFormat, LaunchOptions, Surface, SurfaceEngine, Viewport};
use crate::surface::SharedSurface;

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    closes: AtomicUsize,
    captures: AtomicUsize,
    fail_launches: AtomicUsize,
    fail_next_capture: AtomicBool,
    in_capture: AtomicBool,
    overlapped: AtomicBool,
}

#[derive(Clone)]
pub struct FakeEngine {
    counters: Arc<Counters>,
    launch_delay: Duration,
    capture_delay: Duration,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            launch_delay: Duration::ZERO,
            capture_delay: Duration::from_millis(1),
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    pub fn options() -> LaunchOptions {
        LaunchOptions {
            viewport: Viewport {
                width: 320,
                height: 240,
            },
            url: "about:blank".into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn shared(&self) -> SharedSurface {
        SharedSurface::new(Arc::new(self.clone()), Self::options())
    }

    pub fn fail_next_launches(&self, n: usize) {
        self.counters.fail_launches.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_capture(&self) {
        self.counters.fail_next_capture.store(true, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> usize {
        self.counters.captures.load(Ordering::SeqCst)
    }

    /// True if two captures were ever in flight at once.
    pub fn overlapped(&self) -> bool {
        self.counters.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurfaceEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn launch(&self, _options: &LaunchOptions) -> anyhow::Result<Box<dyn Surface>> {
        tokio::time::sleep(self.launch_delay).await;
        let pending = self.counters.fail_launches.load(Ordering::SeqCst);
        if pending > 0 {
            self.counters.fail_launches.store(pending - 1, Ordering::SeqCst);
            anyhow::bail!("engine refused to start");
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSurface {
            counters: self.counters.clone(),
            capture_delay: self.capture_delay,
        }))
    }
}

struct FakeSurface {
    counters: Arc<Counters>,
    capture_delay: Duration,
}

#[async_trait]
impl Surface for FakeSurface {
    async fn capture(&self, format: ImageFormat) -> anyhow::Result<Vec<u8>> {
        if self.counters.in_capture.swap(true, Ordering::SeqCst) {
            self.counters.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(self.capture_delay).await;
        self.counters.in_capture.store(false, Ordering::SeqCst);

        if self.counters.fail_next_capture.swap(false, Ordering::SeqCst) {
            anyhow::bail!("target crashed");
        }
        let n = self.counters.captures.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}#{n}", format.content_type()).into_bytes())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
