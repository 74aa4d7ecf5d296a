//! OpenID Connect authorization code flow against a confidential client.
//!
//! # Flow Overview
//!
//! 1. Resolve the provider endpoints from its discovery document.
//! 2. Build an authorization URL carrying an application `state` value.
//! 3. Receive the authorization code on the web callback.
//! 4. Exchange the code (plus client secret) for access, refresh and id
//!    tokens, and turn the id token claims into an [`IdentityAssertion`].
//! 5. Refresh access tokens later with the refresh token grant
//!    (see [`crate::refresh`]).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthEngineError, Result};
use crate::id_token::IdTokenClaims;

/// Scopes requested when the configuration does not name any.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Upper bound on any single request to the identity provider.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for an OpenID Connect confidential client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The OAuth client ID.
    pub client_id: String,

    /// The OAuth client secret.
    pub client_secret: String,

    /// Authority base URL, e.g. `https://login.microsoftonline.com`.
    pub authority: String,

    /// Tenant / realm segment appended to the authority.
    pub realm: String,

    /// The redirect URI registered with the provider.
    pub redirect_uri: String,

    /// The scopes to request. Empty means [`DEFAULT_SCOPES`].
    pub scopes: Vec<String>,

    /// Resource requested at sign-in (Azure AD v1 `resource` parameter).
    pub resource: Option<String>,

    /// Resource requested when refreshing, so the refreshed access token can
    /// target a different API than the sign-in token.
    pub refresh_resource: Option<String>,
}

impl OidcConfig {
    /// The well-known discovery document URL for this authority and realm.
    pub fn discovery_url(&self) -> String {
        format!(
            "{}/{}/.well-known/openid-configuration",
            self.authority.trim_end_matches('/'),
            self.realm.trim_matches('/')
        )
    }

    /// Check that every required field is present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthEngineError::InvalidConfig`] naming the first empty field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("authority", &self.authority),
            ("realm", &self.realm),
            ("redirect_uri", &self.redirect_uri),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AuthEngineError::InvalidConfig {
                    reason: format!("missing {name}"),
                });
            }
        }
        Ok(())
    }

    fn scope_param(&self) -> String {
        if self.scopes.is_empty() {
            DEFAULT_SCOPES.join(" ")
        } else {
            self.scopes.join(" ")
        }
    }
}

/// Provider endpoints, normally read from the discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcEndpoints {
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

/// The fields of the discovery document we read.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
}

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

/// The validated outcome of a browser sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAssertion {
    /// Issuer from the id token, if present.
    pub issuer: Option<String>,
    /// Stable subject identifier (`oid`, else `sub`). `None` when the
    /// provider did not send one; callers must reject such assertions.
    pub subject: Option<String>,
    /// Human-readable name for greetings.
    pub display_name: String,
    /// Access token for the sign-in resource.
    pub access_token: String,
    /// Refresh token, when `offline_access` was granted.
    pub refresh_token: Option<String>,
}

/// Raw token endpoint response.
///
/// Some providers (Azure AD v1) send `expires_in` as a string, so it is kept
/// as a loose JSON value.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) refresh_token: Option<String>,
    pub(crate) id_token: Option<String>,
    #[serde(default)]
    pub(crate) expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    /// Seconds until expiry, accepting both numbers and numeric strings.
    pub(crate) fn expires_in_secs(&self) -> Option<i64> {
        match self.expires_in.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

/// The interactive half of an identity provider: building the sign-in URL
/// and redeeming the authorization code.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build the URL the browser is redirected to, carrying `state` unchanged.
    fn authorization_url(&self, state: &str) -> Result<String>;

    /// Exchange an authorization code for an identity assertion.
    async fn exchange_code(&self, code: &str) -> Result<IdentityAssertion>;
}

// ---------------------------------------------------------------------------
// OIDC client
// ---------------------------------------------------------------------------

/// OpenID Connect client bound to one provider.
///
/// Holds no per-flow state; the `state` value and authorization code are
/// passed in explicitly.
pub struct OidcClient {
    pub(crate) config: OidcConfig,
    pub(crate) endpoints: OidcEndpoints,
    pub(crate) http: reqwest::Client,
}

impl OidcClient {
    /// Create a client with already-known endpoints.
    pub fn new(config: OidcConfig, endpoints: OidcEndpoints) -> Self {
        Self {
            config,
            endpoints,
            http: http_client(),
        }
    }

    /// Fetch the discovery document and create a client from it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthEngineError::InvalidConfig`] for an incomplete
    /// configuration, [`AuthEngineError::Discovery`] if the document lacks
    /// the authorization or token endpoint, and
    /// [`AuthEngineError::NetworkError`] on transport failure.
    pub async fn discover(config: OidcConfig) -> Result<Self> {
        config.validate()?;
        let http = http_client();
        let url = config.discovery_url();

        tracing::debug!(url = %url, "fetching OpenID discovery document");

        let response = http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthEngineError::Discovery {
                url,
                reason: format!("HTTP {status}"),
            });
        }

        let doc: DiscoveryDocument = response.json().await?;
        let endpoints = Self::endpoints_from(doc).map_err(|reason| {
            AuthEngineError::Discovery {
                url: url.clone(),
                reason,
            }
        })?;

        tracing::info!(
            issuer = endpoints.issuer.as_deref().unwrap_or("-"),
            "OpenID provider discovered"
        );

        Ok(Self {
            config,
            endpoints,
            http,
        })
    }

    fn endpoints_from(doc: DiscoveryDocument) -> std::result::Result<OidcEndpoints, String> {
        let authorization_endpoint = doc
            .authorization_endpoint
            .filter(|s| !s.is_empty())
            .ok_or("missing authorization_endpoint")?;
        let token_endpoint = doc
            .token_endpoint
            .filter(|s| !s.is_empty())
            .ok_or("missing token_endpoint")?;
        Ok(OidcEndpoints {
            issuer: doc.issuer,
            authorization_endpoint,
            token_endpoint,
        })
    }

    /// Replace the per-request timeout (default [`HTTP_TIMEOUT`]).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    /// The resolved provider endpoints.
    pub fn endpoints(&self) -> &OidcEndpoints {
        &self.endpoints
    }

    /// The client configuration.
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// POST a form to the token endpoint and parse the result.
    ///
    /// An `error` member is treated as a rejection even when the HTTP status
    /// is 200.
    pub(crate) async fn post_token_form(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.endpoints.token_endpoint)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let value: serde_json::Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) => {
                return Err(AuthEngineError::InvalidGrant {
                    reason: format!("HTTP {status}: non-JSON token response"),
                });
            }
        };

        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            let reason = value
                .get("error_description")
                .and_then(|d| d.as_str())
                .map(|d| format!("{error}: {d}"))
                .unwrap_or_else(|| error.to_string());
            return Err(AuthEngineError::InvalidGrant { reason });
        }

        if !status.is_success() {
            return Err(AuthEngineError::InvalidGrant {
                reason: format!("HTTP {status}"),
            });
        }

        Ok(serde_json::from_value(value)?)
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn authorization_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.endpoints.authorization_endpoint)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("response_mode", "query");
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &self.config.redirect_uri);
            params.append_pair("scope", &self.config.scope_param());
            params.append_pair("state", state);
            if let Some(ref resource) = self.config.resource {
                params.append_pair("resource", resource);
            }
        }

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<IdentityAssertion> {
        if code.trim().is_empty() {
            return Err(AuthEngineError::InvalidGrant {
                reason: "empty authorization code".to_string(),
            });
        }

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if let Some(ref resource) = self.config.resource {
            params.push(("resource", resource.as_str()));
        }

        tracing::debug!(token_url = %self.endpoints.token_endpoint, "exchanging authorization code");

        let tokens = self.post_token_form(&params).await?;
        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthEngineError::InvalidIdToken {
                reason: "token response carried no id_token".to_string(),
            })?;
        let claims = IdTokenClaims::decode(id_token)?;

        tracing::debug!(
            expires_in = tokens.expires_in_secs(),
            has_refresh_token = tokens.refresh_token.is_some(),
            "authorization code redeemed"
        );

        Ok(IdentityAssertion {
            issuer: claims.iss.clone(),
            subject: claims.stable_subject().map(String::from),
            display_name: claims.display_name().unwrap_or("there").to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::net::SocketAddr;

    use axum::Router;
    use axum::routing::{get, post};

    use crate::id_token::tests::jwt;

    pub(crate) fn test_config() -> OidcConfig {
        OidcConfig {
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            authority: "https://login.example.com/".to_string(),
            realm: "tenant-1".to_string(),
            redirect_uri: "https://bot.example.com/api/OAuthCallback".to_string(),
            scopes: vec![],
            resource: Some("https://graph.example.com".to_string()),
            refresh_resource: Some("https://crm.example.com".to_string()),
        }
    }

    fn test_endpoints(base: &str) -> OidcEndpoints {
        OidcEndpoints {
            issuer: Some("https://login.example.com/tenant-1/".to_string()),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
        }
    }

    /// Serve `router` on an ephemeral port and return its base URL.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    pub(crate) fn client_for(base: &str) -> OidcClient {
        OidcClient::new(test_config(), test_endpoints(base))
    }

    #[test]
    fn discovery_url_normalizes_slashes() {
        assert_eq!(
            test_config().discovery_url(),
            "https://login.example.com/tenant-1/.well-known/openid-configuration"
        );
    }

    #[test]
    fn validate_reports_missing_field() {
        let mut config = test_config();
        config.client_secret = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn authorization_url_carries_state_unchanged() {
        let client = client_for("https://login.example.com/tenant-1/oauth2");
        let state = r#"{"channel_id":"telegram","conversation_id":"42","user_id":"7"}"#;
        let url_str = client.authorization_url(state).unwrap();

        let url = Url::parse(&url_str).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().collect();

        assert_eq!(params.get("state").unwrap(), state);
        assert_eq!(params.get("response_type").unwrap(), "code");
        assert_eq!(params.get("response_mode").unwrap(), "query");
        assert_eq!(params.get("client_id").unwrap(), "client-1");
        assert_eq!(params.get("scope").unwrap(), "openid profile offline_access");
        assert_eq!(params.get("resource").unwrap(), "https://graph.example.com");
        assert!(!params.contains_key("nonce"));
    }

    #[test]
    fn authorization_url_uses_configured_scopes() {
        let mut config = test_config();
        config.scopes = vec!["openid".into(), "email".into()];
        config.resource = None;
        let client = OidcClient::new(config, test_endpoints("https://idp.example.com"));
        let url = Url::parse(&client.authorization_url("s").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(params.get("scope").unwrap(), "openid email");
        assert!(!params.contains_key("resource"));
    }

    #[test]
    fn token_response_accepts_string_expiry() {
        let json = r#"{ "access_token": "a", "expires_in": "3599" }"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.expires_in_secs(), Some(3599));

        let json = r#"{ "access_token": "a", "expires_in": 60 }"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.expires_in_secs(), Some(60));
    }

    #[test]
    fn endpoints_from_rejects_incomplete_document() {
        let doc = DiscoveryDocument {
            issuer: None,
            authorization_endpoint: Some("https://idp/authorize".into()),
            token_endpoint: None,
        };
        assert_eq!(
            OidcClient::endpoints_from(doc).unwrap_err(),
            "missing token_endpoint"
        );
    }

    #[tokio::test]
    async fn exchange_code_builds_assertion_from_id_token() {
        let id_token = jwt(serde_json::json!({ "oid": "oid-7", "name": "Grace Hopper" }));
        let router = Router::new().route(
            "/token",
            post(move || {
                let id_token = id_token.clone();
                async move {
                    axum::Json(serde_json::json!({
                        "access_token": "graph-token",
                        "refresh_token": "refresh-token",
                        "id_token": id_token,
                        "expires_in": "3599",
                    }))
                }
            }),
        );
        let base = serve(router).await;

        let assertion = client_for(&base).exchange_code("auth-code").await.unwrap();
        assert_eq!(assertion.subject.as_deref(), Some("oid-7"));
        assert_eq!(assertion.display_name, "Grace Hopper");
        assert_eq!(assertion.access_token, "graph-token");
        assert_eq!(assertion.refresh_token.as_deref(), Some("refresh-token"));
    }

    #[tokio::test]
    async fn exchange_code_without_subject_yields_none() {
        let id_token = jwt(serde_json::json!({ "name": "Nobody" }));
        let router = Router::new().route(
            "/token",
            post(move || {
                let id_token = id_token.clone();
                async move {
                    axum::Json(serde_json::json!({
                        "access_token": "a",
                        "id_token": id_token,
                    }))
                }
            }),
        );
        let base = serve(router).await;

        let assertion = client_for(&base).exchange_code("code").await.unwrap();
        assert!(assertion.subject.is_none());
    }

    #[tokio::test]
    async fn exchange_code_surfaces_provider_error() {
        let router = Router::new().route(
            "/token",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    axum::Json(serde_json::json!({
                        "error": "invalid_grant",
                        "error_description": "code already redeemed",
                    })),
                )
            }),
        );
        let base = serve(router).await;

        let err = client_for(&base).exchange_code("code").await.unwrap_err();
        assert!(matches!(err, AuthEngineError::InvalidGrant { .. }));
        assert!(err.to_string().contains("code already redeemed"));
    }

    #[tokio::test]
    async fn exchange_code_rejects_empty_code_without_network() {
        let client = client_for("http://127.0.0.1:1");
        let err = client.exchange_code("  ").await.unwrap_err();
        assert!(matches!(err, AuthEngineError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn stalled_token_endpoint_times_out() {
        let router = Router::new().route(
            "/token",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let base = serve(router).await;

        let client = client_for(&base).with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = client.exchange_code("code").await.unwrap_err();
        assert!(matches!(err, AuthEngineError::NetworkError(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn discover_reads_endpoints() {
        let router = Router::new().route(
            "/tenant-1/.well-known/openid-configuration",
            get(|| async {
                axum::Json(serde_json::json!({
                    "issuer": "https://idp.example.com/tenant-1/",
                    "authorization_endpoint": "https://idp.example.com/tenant-1/authorize",
                    "token_endpoint": "https://idp.example.com/tenant-1/token",
                }))
            }),
        );
        let base = serve(router).await;

        let mut config = test_config();
        config.authority = base;
        let client = OidcClient::discover(config).await.unwrap();
        assert_eq!(
            client.endpoints().token_endpoint,
            "https://idp.example.com/tenant-1/token"
        );
    }

    #[tokio::test]
    async fn discover_fails_on_http_error() {
        let base = serve(Router::new()).await;
        let mut config = test_config();
        config.authority = base;
        let Err(err) = OidcClient::discover(config).await else {
            panic!("discovery against an empty server should fail");
        };
        assert!(matches!(err, AuthEngineError::Discovery { .. }));
    }

    #[test]
    fn oidc_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OidcClient>();
        assert_send_sync::<OidcConfig>();
        assert_send_sync::<IdentityAssertion>();
    }
}
