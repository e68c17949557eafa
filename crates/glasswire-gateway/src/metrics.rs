//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record one frame delivered on a feed.
pub fn record_frame(profile: &str) {
    let labels = [("profile", profile.to_string())];
    metrics::counter!("frames_sent_total", &labels).increment(1);
}

/// Record a feed subscriber connecting.
pub fn record_feed_open(profile: &str) {
    let labels = [("profile", profile.to_string())];
    metrics::gauge!("feeds_active", &labels).increment(1.0);
}

/// Record a feed subscriber going away.
pub fn record_feed_close(profile: &str) {
    let labels = [("profile", profile.to_string())];
    metrics::gauge!("feeds_active", &labels).decrement(1.0);
}

/// Mirror the surface's fault and launch counters.
pub fn record_surface(launches: u64, faults: u64) {
    metrics::gauge!("surface_launches").set(launches as f64);
    metrics::gauge!("surface_capture_faults").set(faults as f64);
}

/// Record a relay request falling back to the secondary backend.
pub fn record_fallback(flavor: &str) {
    let labels = [("flavor", flavor.to_string())];
    metrics::counter!("relay_fallbacks_total", &labels).increment(1);
}

pub fn record_session_open() {
    metrics::gauge!("relay_sessions_active").increment(1.0);
}

pub fn record_session_close() {
    metrics::gauge!("relay_sessions_active").decrement(1.0);
}
