//! HTTP/WebSocket gateway.
//!
//! Serves the shared surface as cadenced multipart JPEG feeds, single PNG
//! snapshots from a throwaway surface, and the token relay WebSockets that
//! stream model output to clients with a non-streaming fallback.

pub mod connection;
pub mod feeds;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod registry;
pub mod segment;
pub mod server;
pub mod session;
pub mod state;

pub use registry::SessionRegistry;
pub use server::{router, serve, start_gateway};
pub use session::{RelayBackends, RelayFlavor, RelaySession};
pub use state::GatewayState;
