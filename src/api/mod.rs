//! Local HTTP control API.
//!
//! Wrapper processes register sessions and report status here; display
//! adapters read snapshots and issue kills.

use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::store::SessionStore;

pub mod client;
pub mod handlers;
pub mod server;

/// Shared state handed to every request handler.
#[derive(Debug)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// The session registry.
    pub store: Arc<SessionStore>,
}

impl AppState {
    /// Bundle configuration and store for the router.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, store: Arc<SessionStore>) -> Self {
        Self { config, store }
    }
}
