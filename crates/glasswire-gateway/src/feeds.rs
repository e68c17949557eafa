//! Frame feed and snapshot handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tracing::{info, warn};

use glasswire_surface::frame::MULTIPART_CONTENT_TYPE;
use glasswire_surface::{StreamProfile, snapshot};

use crate::state::GatewayState;

pub async fn stream_handler(State(state): State<Arc<GatewayState>>) -> Response {
    feed(&state, state.standard.clone())
}

pub async fn stream_fast_handler(State(state): State<Arc<GatewayState>>) -> Response {
    feed(&state, state.fast.clone())
}

fn feed(state: &GatewayState, profile: StreamProfile) -> Response {
    info!(profile = %profile.name, fps = profile.target_fps, "Feed subscriber connected");

    #[cfg(feature = "metrics")]
    let tracker = FeedTracker::open(&profile.name);

    let frames = state.scheduler.open_stream(profile).map(move |frame| {
        #[cfg(feature = "metrics")]
        crate::metrics::record_frame(&tracker.profile);
        Ok::<Bytes, Infallible>(frame.to_multipart())
    });

    (
        [
            (header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Keeps the active-feed gauge honest; dropped with the response body.
#[cfg(feature = "metrics")]
struct FeedTracker {
    profile: String,
}

#[cfg(feature = "metrics")]
impl FeedTracker {
    fn open(profile: &str) -> Self {
        crate::metrics::record_feed_open(profile);
        Self {
            profile: profile.to_string(),
        }
    }
}

#[cfg(feature = "metrics")]
impl Drop for FeedTracker {
    fn drop(&mut self) {
        crate::metrics::record_feed_close(&self.profile);
    }
}

/// One PNG from a throwaway surface; the shared surface is not touched.
pub async fn screenshot_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match snapshot::single_shot(state.engine.as_ref(), &state.snapshot_options).await {
        Ok(frame) => (
            [
                (header::CONTENT_TYPE, frame.content_type),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            frame.data,
        )
            .into_response(),
        Err(e) => {
            warn!(%e, "Snapshot failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Minimal viewer page for the two feeds.
pub async fn index_handler() -> Html<&'static str> {
    Html(VIEWER_HTML)
}

const VIEWER_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>glasswire</title>
  <style>
    body { font-family: sans-serif; margin: 0; padding: 20px; background: #f0f0f0; text-align: center; }
    .frame { background: #fff; padding: 16px; border-radius: 8px; display: inline-block; }
    img { max-width: 100%; height: auto; border: 1px solid #ddd; }
    button { padding: 8px 16px; margin: 4px; border: 0; border-radius: 4px; background: #0f62fe; color: #fff; cursor: pointer; }
  </style>
</head>
<body>
  <h1>Live surface</h1>
  <div class="frame"><img id="feed" src="/stream" alt="live surface"></div>
  <div>
    <button onclick="show('/stream')">Standard</button>
    <button onclick="show('/stream-fast')">Fast</button>
    <button onclick="window.open('/screenshot', '_blank')">Snapshot</button>
  </div>
  <p>Feed: <code id="current">/stream</code></p>
  <script>
    function show(url) {
      document.getElementById('feed').src = url;
      document.getElementById('current').textContent = url;
    }
  </script>
</body>
</html>
"#;
