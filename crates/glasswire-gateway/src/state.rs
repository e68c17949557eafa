//! Gateway shared state.

use std::sync::Arc;
use std::time::Instant;

use glasswire_core::config::Config;
use glasswire_core::protocol::ModelRoster;
use glasswire_surface::{
    CaptureScheduler, LaunchOptions, SharedSurface, StreamProfile, SurfaceEngine,
};

use crate::registry::SessionRegistry;
use crate::session::RelayBackends;

/// Shared gateway state accessible from all handlers and connections.
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Engine for throwaway single-shot surfaces.
    pub engine: Arc<dyn SurfaceEngine>,
    pub snapshot_options: LaunchOptions,
    pub scheduler: CaptureScheduler,
    pub standard: StreamProfile,
    pub fast: StreamProfile,
    pub backends: RelayBackends,
    pub roster: ModelRoster,
    pub registry: SessionRegistry,
    pub started_at: Instant,
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    /// Wire up the surface, scheduler, and registry from config.
    ///
    /// Nothing is launched here; the shared surface comes up on the first
    /// frame request.
    pub fn new(config: Config, engine: Arc<dyn SurfaceEngine>, backends: RelayBackends) -> Self {
        let surface_config = config.surface();
        let capture = config.capture();

        let surface = Arc::new(SharedSurface::new(
            engine.clone(),
            LaunchOptions::shared(&surface_config),
        ));
        let roster = ModelRoster::single(backends.primary.model());

        Self {
            engine,
            snapshot_options: LaunchOptions::snapshot(&surface_config),
            scheduler: CaptureScheduler::new(surface.clone(), &capture),
            standard: StreamProfile::from_config("standard", &capture.standard),
            fast: StreamProfile::from_config("fast", &capture.fast),
            backends,
            roster,
            registry: SessionRegistry::new(surface),
            started_at: Instant::now(),
            config: Arc::new(config),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Attach a Prometheus handle so `/metrics` can render it.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn surface(&self) -> &Arc<SharedSurface> {
        self.scheduler.surface()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
