//! OpenID Connect client for AuthBot.
//!
//! This crate talks to the identity provider on behalf of the bot:
//!
//! - **Discovery** of the authorization and token endpoints
//! - **Authorization code flow** for a confidential client, with the
//!   application `state` round-tripped untouched
//! - **Id token claims** decoding for the signed-in user's identity
//! - **Refresh token grant** behind the [`TokenRefresher`] seam
//!
//! # Architecture
//!
//! ```text
//! OidcClient
//! ├── IdentityProvider  (authorization URL + code exchange)
//! ├── TokenRefresher    (refresh token grant)
//! └── IdTokenClaims     (subject + display name)
//! ```

pub mod error;
pub mod id_token;
pub mod oidc;
pub mod refresh;

// Re-export key types at the crate root for convenience.
pub use error::{AuthEngineError, Result};
pub use id_token::IdTokenClaims;
pub use oidc::{IdentityAssertion, IdentityProvider, OidcClient, OidcConfig, OidcEndpoints};
pub use refresh::{RefreshedTokens, TokenRefresher};
