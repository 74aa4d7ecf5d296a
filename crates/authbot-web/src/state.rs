//! Shared application state for the web server.

use std::sync::Arc;

use authbot_core::LoginCallback;
use authbot_store::PendingLoginRegistry;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Completes browser sign-ins and builds provider redirects.
    pub callback: Arc<LoginCallback>,

    /// Registry the callback writes to; read here only for `/api/status`.
    pub registry: Arc<dyn PendingLoginRegistry>,
}

impl AppState {
    pub fn new(callback: Arc<LoginCallback>, registry: Arc<dyn PendingLoginRegistry>) -> Self {
        Self { callback, registry }
    }
}
