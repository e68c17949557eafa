//! Single-shot capture on a throwaway surface.
//!
//! Never touches the shared surface or its lock.

use bytes::Bytes;
use tracing::{info, warn};

use crate::engine::{ImageFormat, LaunchOptions, SurfaceEngine};
use crate::frame::Frame;
use crate::surface::SurfaceError;

/// Launch a fresh surface, take one PNG, and close it again.
pub async fn single_shot(
    engine: &dyn SurfaceEngine,
    options: &LaunchOptions,
) -> Result<Frame, SurfaceError> {
    info!(engine = engine.name(), url = %options.url, "Single-shot capture");

    let surface = tokio::time::timeout(options.timeout, engine.launch(options))
        .await
        .map_err(|_| SurfaceError::LaunchTimeout(options.timeout))?
        .map_err(|e| SurfaceError::Launch(e.to_string()))?;

    let captured = surface.capture(ImageFormat::Png).await;

    if let Err(e) = surface.close().await {
        warn!(%e, "Failed to close single-shot surface");
    }

    let data = captured.map_err(|e| SurfaceError::Capture(e.to_string()))?;
    Ok(Frame {
        seq: 1,
        content_type: ImageFormat::Png.content_type(),
        data: Bytes::from(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeEngine;

    #[tokio::test]
    async fn test_single_shot_uses_its_own_surface() {
        let engine = FakeEngine::new();
        let shared = engine.shared();
        drop(shared.acquire().await.unwrap());

        // hold the shared lock; the snapshot must not wait on it
        let _guard = shared.acquire().await.unwrap();
        let frame = single_shot(&engine, &FakeEngine::options()).await.unwrap();

        assert_eq!(frame.content_type, "image/png");
        assert!(!frame.data.is_empty());
        assert_eq!(engine.launches(), 2);
        assert_eq!(engine.closes(), 1);
    }

    #[tokio::test]
    async fn test_single_shot_closes_after_failed_capture() {
        let engine = FakeEngine::new();
        engine.fail_next_capture();

        let err = single_shot(&engine, &FakeEngine::options()).await.unwrap_err();
        assert!(matches!(err, SurfaceError::Capture(_)));
        assert_eq!(engine.closes(), 1);
    }
}
