//! OpenID Connect id token claims.
//!
//! The id token is taken from the token endpoint response, which the client
//! reaches directly over TLS, so the payload is decoded without verifying
//! the signature (OpenID Connect Core 1.0, section 3.1.3.7).

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{AuthEngineError, Result};

/// The subset of id token claims the bot cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer identifier.
    #[serde(default)]
    pub iss: Option<String>,
    /// Subject identifier, unique per issuer (and per client for pairwise ids).
    #[serde(default)]
    pub sub: Option<String>,
    /// Azure AD object id, stable across applications.
    #[serde(default)]
    pub oid: Option<String>,
    /// Full display name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub upn: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry as a unix timestamp.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl IdTokenClaims {
    /// Decode the claims segment of a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns [`AuthEngineError::InvalidIdToken`] if the token does not have
    /// three segments or the payload is not base64url-encoded JSON.
    pub fn decode(id_token: &str) -> Result<Self> {
        let mut parts = id_token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
            _ => {
                return Err(AuthEngineError::InvalidIdToken {
                    reason: "expected three dot-separated segments".to_string(),
                });
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| URL_SAFE.decode(payload))
            .map_err(|e| AuthEngineError::InvalidIdToken {
                reason: format!("payload is not base64url: {e}"),
            })?;

        serde_json::from_slice(&bytes).map_err(|e| AuthEngineError::InvalidIdToken {
            reason: format!("payload is not a JSON claims object: {e}"),
        })
    }

    /// The stable subject identifier: `oid` when the provider sends one,
    /// otherwise `sub`. Blank values count as absent.
    pub fn stable_subject(&self) -> Option<&str> {
        [self.oid.as_deref(), self.sub.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Best available human-readable name for the user.
    pub fn display_name(&self) -> Option<&str> {
        [
            self.name.as_deref(),
            self.preferred_username.as_deref(),
            self.upn.as_deref(),
            self.email.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an unsigned JWT carrying `claims`.
    pub(crate) fn jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn decode_full_claims() {
        let token = jwt(serde_json::json!({
            "iss": "https://sts.windows.net/tenant/",
            "sub": "sub-1",
            "oid": "oid-1",
            "name": "Ada Lovelace",
            "upn": "ada@example.com",
            "exp": 1_700_000_000_i64,
        }));

        let claims = IdTokenClaims::decode(&token).unwrap();
        assert_eq!(claims.iss.as_deref(), Some("https://sts.windows.net/tenant/"));
        assert_eq!(claims.stable_subject(), Some("oid-1"));
        assert_eq!(claims.display_name(), Some("Ada Lovelace"));
        assert_eq!(claims.exp, Some(1_700_000_000));
    }

    #[test]
    fn stable_subject_falls_back_to_sub() {
        let claims = IdTokenClaims {
            sub: Some("sub-only".into()),
            ..Default::default()
        };
        assert_eq!(claims.stable_subject(), Some("sub-only"));
    }

    #[test]
    fn blank_subject_is_absent() {
        let claims = IdTokenClaims {
            oid: Some("  ".into()),
            sub: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(claims.stable_subject(), None);
    }

    #[test]
    fn display_name_falls_back_through_claims() {
        let claims = IdTokenClaims {
            preferred_username: Some("ada@example.com".into()),
            email: Some("other@example.com".into()),
            ..Default::default()
        };
        assert_eq!(claims.display_name(), Some("ada@example.com"));
    }

    #[test]
    fn decode_rejects_wrong_segment_count() {
        assert!(IdTokenClaims::decode("only.two").is_err());
        assert!(IdTokenClaims::decode("a.b.c.d").is_err());
        assert!(IdTokenClaims::decode("").is_err());
    }

    #[test]
    fn decode_rejects_non_json_payload() {
        let payload = URL_SAFE_NO_PAD.encode("not json");
        let err = IdTokenClaims::decode(&format!("h.{payload}.s")).unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn decode_accepts_padded_payload() {
        let payload = URL_SAFE.encode(r#"{"sub":"x"}"#);
        let claims = IdTokenClaims::decode(&format!("h.{payload}.s")).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("x"));
    }
}
