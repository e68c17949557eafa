//! Live relay sessions and the one-time shutdown path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use glasswire_surface::SharedSurface;

use crate::session::RelayFlavor;

/// One connected relay client, as listed under `clients` in `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub flavor: &'static str,
    pub connected_at: DateTime<Utc>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionInfo>>,
    surface: Arc<SharedSurface>,
    shut_down: AtomicBool,
}

impl SessionRegistry {
    pub fn new(surface: Arc<SharedSurface>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            surface,
            shut_down: AtomicBool::new(false),
        }
    }

    pub async fn register(&self, id: &str, flavor: RelayFlavor) {
        let info = SessionInfo {
            id: id.to_string(),
            flavor: flavor.as_str(),
            connected_at: Utc::now(),
        };
        self.sessions.write().await.insert(id.to_string(), info);
        #[cfg(feature = "metrics")]
        crate::metrics::record_session_open();
    }

    pub async fn unregister(&self, id: &str) {
        if self.sessions.write().await.remove(id).is_some() {
            #[cfg(feature = "metrics")]
            crate::metrics::record_session_close();
        }
    }

    pub async fn active(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Sessions ordered by connect time.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Close the shared surface. Only the first call does anything.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let sessions = self.active().await;
        info!(sessions, "Shutting down, closing shared surface");
        self.surface.close().await;
    }
}
