//! Call-agent server
//!
//! Accepts gateway connections, runs handshake/tenant-resolution/admission,
//! and hands each admitted call to its own turn-controller task. A small
//! axum router exposes the passive observability surface (`/healthz`,
//! `/metrics`).

pub mod http;
pub mod listener;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use listener::{run_listener, serve_on};
pub use metrics::init_metrics;
pub use session::{AdmissionControl, AdmissionPermit, SessionHandle, SessionManager};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Admission ceiling reached; counted separately from failures
    #[error("admission rejected: at capacity")]
    AdmissionRejected,

    #[error(transparent)]
    Protocol(#[from] call_agent_protocol::ProtocolError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
