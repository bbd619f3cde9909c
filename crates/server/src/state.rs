//! Application state
//!
//! Shared by the audio listeners and the observability router.

use std::sync::Arc;

use call_agent_agent::ControllerDeps;
use call_agent_config::Settings;
use call_agent_core::TenantDirectory;

use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub directory: Arc<dyn TenantDirectory>,
    pub sessions: Arc<SessionManager>,
    pub deps: ControllerDeps,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        directory: Arc<dyn TenantDirectory>,
        sessions: Arc<SessionManager>,
        deps: ControllerDeps,
    ) -> Self {
        Self {
            settings,
            directory,
            sessions,
            deps,
        }
    }
}
