//! HTTP side of AuthBot.
//!
//! - `GET /login?address=...` redirects the browser to the identity provider
//! - `GET /api/OAuthCallback` receives the provider redirect and shows the
//!   magic code
//! - `GET /api/status` reports health as JSON

pub mod api;
pub mod pages;
pub mod server;
pub mod state;

pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 3979,
        }
    }
}
