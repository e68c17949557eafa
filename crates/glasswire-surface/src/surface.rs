//! The Shared Surface Handle.
//!
//! Exactly one live surface exists at a time. Initialization, capture, and
//! teardown all go through the same async mutex, so a capture can never
//! overlap another capture or a teardown, and two callers racing on a cold
//! handle launch the engine once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::engine::{ImageFormat, LaunchOptions, Surface, SurfaceEngine};

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Surface launch failed: {0}")]
    Launch(String),

    #[error("Surface launch timed out after {0:?}")]
    LaunchTimeout(Duration),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Surface is closed")]
    Closed,
}

/// Observable lifecycle state of the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Ready,
    /// Shut down for good; `acquire` refuses to relaunch.
    Closed,
}

impl SurfaceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Closed => "closed",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Ready,
            2 => Self::Closed,
            _ => Self::Uninitialized,
        }
    }
}

enum Slot {
    Uninitialized,
    Ready(Box<dyn Surface>),
    Closed,
}

impl Slot {
    fn state(&self) -> SurfaceState {
        match self {
            Self::Uninitialized => SurfaceState::Uninitialized,
            Self::Ready(_) => SurfaceState::Ready,
            Self::Closed => SurfaceState::Closed,
        }
    }
}

/// Owner of the single shared rendering surface.
pub struct SharedSurface {
    engine: Arc<dyn SurfaceEngine>,
    options: LaunchOptions,
    slot: Mutex<Slot>,
    // Mirror of the slot state, readable without taking the lock.
    state: AtomicU8,
    launches: AtomicU64,
    faults: AtomicU64,
}

impl SharedSurface {
    pub fn new(engine: Arc<dyn SurfaceEngine>, options: LaunchOptions) -> Self {
        Self {
            engine,
            options,
            slot: Mutex::new(Slot::Uninitialized),
            state: AtomicU8::new(0),
            launches: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    /// Lock the surface, launching it first if needed.
    ///
    /// The lock is held until the returned guard drops. A failed launch
    /// leaves the handle uninitialized so the next caller retries.
    pub async fn acquire(&self) -> Result<SurfaceGuard<'_>, SurfaceError> {
        let mut slot = self.slot.lock().await;

        match &*slot {
            Slot::Ready(_) => {}
            Slot::Closed => return Err(SurfaceError::Closed),
            Slot::Uninitialized => {
                info!(
                    engine = self.engine.name(),
                    url = %self.options.url,
                    width = self.options.viewport.width,
                    height = self.options.viewport.height,
                    "Launching shared surface"
                );
                let launched =
                    tokio::time::timeout(self.options.timeout, self.engine.launch(&self.options))
                        .await;
                let surface = match launched {
                    Ok(Ok(surface)) => surface,
                    Ok(Err(e)) => {
                        warn!(%e, "Shared surface launch failed");
                        return Err(SurfaceError::Launch(e.to_string()));
                    }
                    Err(_) => {
                        warn!(timeout = ?self.options.timeout, "Shared surface launch timed out");
                        return Err(SurfaceError::LaunchTimeout(self.options.timeout));
                    }
                };
                self.launches.fetch_add(1, Ordering::SeqCst);
                *slot = Slot::Ready(surface);
                self.publish(&slot);
            }
        }

        Ok(SurfaceGuard {
            owner: self,
            slot,
        })
    }

    /// Close the current surface and return to uninitialized. Idempotent.
    pub async fn teardown(&self) {
        let mut slot = self.slot.lock().await;
        self.close_slot(&mut slot, Slot::Uninitialized).await;
    }

    /// Close the current surface for good. Later `acquire` calls fail with
    /// [`SurfaceError::Closed`].
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        self.close_slot(&mut slot, Slot::Closed).await;
    }

    pub fn state(&self) -> SurfaceState {
        SurfaceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of successful engine launches so far.
    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of capture faults that forced a teardown.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::SeqCst)
    }

    async fn close_slot(&self, slot: &mut MutexGuard<'_, Slot>, next: Slot) {
        let previous = std::mem::replace(&mut **slot, next);
        self.publish(slot);
        if let Slot::Ready(surface) = previous {
            match surface.close().await {
                Ok(()) => debug!("Shared surface closed"),
                Err(e) => warn!(%e, "Shared surface close failed"),
            }
        }
    }

    fn publish(&self, slot: &Slot) {
        let v = match slot.state() {
            SurfaceState::Uninitialized => 0,
            SurfaceState::Ready => 1,
            SurfaceState::Closed => 2,
        };
        self.state.store(v, Ordering::SeqCst);
    }
}

/// Exclusive access to a ready surface.
pub struct SurfaceGuard<'a> {
    owner: &'a SharedSurface,
    slot: MutexGuard<'a, Slot>,
}

impl SurfaceGuard<'_> {
    pub async fn capture(&self, format: ImageFormat) -> Result<Vec<u8>, SurfaceError> {
        match &*self.slot {
            Slot::Ready(surface) => surface
                .capture(format)
                .await
                .map_err(|e| SurfaceError::Capture(e.to_string())),
            // acquire only hands out guards over a ready slot
            _ => Err(SurfaceError::Closed),
        }
    }

    /// Treat the surface as faulted: close it while still holding the lock
    /// so the next `acquire` relaunches from scratch.
    pub async fn teardown(mut self) {
        self.owner.faults.fetch_add(1, Ordering::SeqCst);
        let owner = self.owner;
        owner.close_slot(&mut self.slot, Slot::Uninitialized).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeEngine;

    #[tokio::test]
    async fn test_lazy_init_on_first_acquire() {
        let engine = FakeEngine::new();
        let surface = engine.shared();
        assert_eq!(surface.state(), SurfaceState::Uninitialized);
        assert_eq!(engine.launches(), 0);

        let guard = surface.acquire().await.unwrap();
        let image = guard.capture(ImageFormat::Jpeg { quality: 75 }).await.unwrap();
        assert!(!image.is_empty());
        drop(guard);

        assert_eq!(surface.state(), SurfaceState::Ready);
        assert_eq!(engine.launches(), 1);

        // warm handle does not relaunch
        drop(surface.acquire().await.unwrap());
        assert_eq!(engine.launches(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_launches_once() {
        let engine = FakeEngine::new().with_launch_delay(Duration::from_millis(20));
        let surface = Arc::new(engine.shared());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let surface = surface.clone();
            tasks.push(tokio::spawn(async move {
                let guard = surface.acquire().await.unwrap();
                guard.capture(ImageFormat::Png).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(engine.launches(), 1);
        assert!(!engine.overlapped());
    }

    #[tokio::test]
    async fn test_failed_launch_leaves_handle_retryable() {
        let engine = FakeEngine::new();
        engine.fail_next_launches(1);
        let surface = engine.shared();

        let err = surface.acquire().await.err().unwrap();
        assert!(matches!(err, SurfaceError::Launch(_)));
        assert_eq!(surface.state(), SurfaceState::Uninitialized);

        assert!(surface.acquire().await.is_ok());
        assert_eq!(surface.state(), SurfaceState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_timeout() {
        let engine = FakeEngine::new().with_launch_delay(Duration::from_secs(120));
        let surface = engine.shared();

        let err = surface.acquire().await.err().unwrap();
        assert!(matches!(err, SurfaceError::LaunchTimeout(_)));
        assert_eq!(surface.state(), SurfaceState::Uninitialized);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent_and_reinitializes() {
        let engine = FakeEngine::new();
        let surface = engine.shared();

        surface.teardown().await;
        assert_eq!(engine.closes(), 0);

        drop(surface.acquire().await.unwrap());
        surface.teardown().await;
        surface.teardown().await;
        assert_eq!(engine.closes(), 1);
        assert_eq!(surface.state(), SurfaceState::Uninitialized);

        drop(surface.acquire().await.unwrap());
        assert_eq!(engine.launches(), 2);
    }

    #[tokio::test]
    async fn test_guard_teardown_counts_fault() {
        let engine = FakeEngine::new();
        let surface = engine.shared();

        let guard = surface.acquire().await.unwrap();
        guard.teardown().await;

        assert_eq!(surface.faults(), 1);
        assert_eq!(engine.closes(), 1);
        assert_eq!(surface.state(), SurfaceState::Uninitialized);
    }

    #[tokio::test]
    async fn test_close_refuses_relaunch() {
        let engine = FakeEngine::new();
        let surface = engine.shared();

        drop(surface.acquire().await.unwrap());
        surface.close().await;
        surface.close().await;

        assert_eq!(engine.closes(), 1);
        assert_eq!(surface.state(), SurfaceState::Closed);
        assert!(matches!(
            surface.acquire().await.err().unwrap(),
            SurfaceError::Closed
        ));
    }

    /// Runs `stop` against a surface that is mid-capture and checks it only
    /// takes effect once the capture has returned.
    async fn assert_waits_for_capture(close_for_good: bool) {
        let engine = FakeEngine::new().with_capture_delay(Duration::from_millis(100));
        let surface = Arc::new(engine.shared());
        let guard = surface.acquire().await.unwrap();

        let stopper = {
            let surface = surface.clone();
            tokio::spawn(async move {
                if close_for_good {
                    surface.close().await;
                } else {
                    surface.teardown().await;
                }
                tokio::time::Instant::now()
            })
        };
        tokio::task::yield_now().await;
        assert!(!stopper.is_finished());

        guard.capture(ImageFormat::Png).await.unwrap();
        let captured_at = tokio::time::Instant::now();
        assert_eq!(engine.closes(), 0);
        assert!(!stopper.is_finished());
        drop(guard);

        let stopped_at = stopper.await.unwrap();
        assert!(stopped_at >= captured_at);
        assert_eq!(engine.closes(), 1);
        let expected = if close_for_good {
            SurfaceState::Closed
        } else {
            SurfaceState::Uninitialized
        };
        assert_eq!(surface.state(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_waits_for_capture_in_progress() {
        assert_waits_for_capture(true).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_waits_for_capture_in_progress() {
        assert_waits_for_capture(false).await;
    }
}
