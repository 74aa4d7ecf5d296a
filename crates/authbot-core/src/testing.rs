//! Test doubles for the identity provider and token refresher.
//!
//! Compiled for this crate's unit tests and, through the `testing` feature,
//! for downstream integration tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use authbot_auth_engine::{
    AuthEngineError, IdentityAssertion, IdentityProvider, RefreshedTokens, TokenRefresher,
};

#[derive(Debug, Clone)]
enum Identity {
    /// Every exchange signs in this user.
    Fixed(String),
    /// The authorization code is the user's name.
    Echo,
    NoSubject,
    Fail,
}

/// [`IdentityProvider`] that never leaves the process.
pub struct FakeProvider {
    identity: Identity,
    exchanges: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn signing_in(name: &str) -> Self {
        Self::with(Identity::Fixed(name.to_string()))
    }

    /// Sign in whoever the authorization code names.
    pub fn echo() -> Self {
        Self::with(Identity::Echo)
    }

    pub fn without_subject() -> Self {
        Self::with(Identity::NoSubject)
    }

    pub fn failing() -> Self {
        Self::with(Identity::Fail)
    }

    fn with(identity: Identity) -> Self {
        Self {
            identity,
            exchanges: Arc::default(),
        }
    }

    /// Counter of `exchange_code` calls.
    pub fn exchanges(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.exchanges)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, state: &str) -> authbot_auth_engine::Result<String> {
        let url = url::Url::parse_with_params(
            "https://idp.test/authorize",
            &[("response_type", "code"), ("state", state)],
        )?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> authbot_auth_engine::Result<IdentityAssertion> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let name = match &self.identity {
            Identity::Fail => {
                return Err(AuthEngineError::InvalidGrant {
                    reason: "AADSTS70008: code expired".into(),
                });
            }
            Identity::Fixed(name) => name.clone(),
            Identity::Echo | Identity::NoSubject => code.to_string(),
        };
        let subject = match self.identity {
            Identity::NoSubject => None,
            _ => Some(format!("oid-{name}")),
        };
        Ok(IdentityAssertion {
            issuer: Some("https://idp.test/".into()),
            subject,
            access_token: format!("at-{name}"),
            refresh_token: Some(format!("rt-{name}")),
            display_name: name,
        })
    }
}

/// [`TokenRefresher`] with a switchable outcome and a call log.
#[derive(Default)]
pub struct FakeRefresher {
    failing: std::sync::atomic::AtomicBool,
    rotate: std::sync::atomic::AtomicBool,
    stalled: std::sync::atomic::AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let refresher = Self::default();
        refresher.set_failing(true);
        refresher
    }

    /// Every refresh hangs forever, like a provider that never answers.
    pub fn stalled() -> Self {
        let refresher = Self::default();
        refresher.stalled.store(true, Ordering::SeqCst);
        refresher
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hand out a new refresh token on each call.
    pub fn set_rotating(&self, rotate: bool) {
        self.rotate.store(rotate, Ordering::SeqCst);
    }

    /// Refresh tokens presented so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh(&self, refresh_token: &str) -> authbot_auth_engine::Result<RefreshedTokens> {
        let n = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| AuthEngineError::InvalidGrant {
                    reason: "poisoned".into(),
                })?;
            calls.push(refresh_token.to_string());
            calls.len()
        };
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthEngineError::InvalidGrant {
                reason: "AADSTS700082: refresh token expired".into(),
            });
        }
        Ok(RefreshedTokens {
            access_token: format!("crm-{n}"),
            refresh_token: self
                .rotate
                .load(Ordering::SeqCst)
                .then(|| format!("rt-rotated-{n}")),
        })
    }
}
