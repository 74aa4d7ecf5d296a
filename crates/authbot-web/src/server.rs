//! Router assembly and the HTTP listener.

use std::future::Future;
use std::sync::Arc;

use authbot_core::config::{CALLBACK_PATH, LOGIN_PATH};
use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::WebConfig;
use crate::api;
use crate::state::AppState;

/// The AuthBot web server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let addr = self.addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "starting web server");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// Build the router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(LOGIN_PATH, get(api::login))
        // The provider may be registered with or without the trailing slash.
        .route(CALLBACK_PATH, get(api::oauth_callback))
        .route(&format!("{CALLBACK_PATH}/"), get(api::oauth_callback))
        .route("/api/status", get(api::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
