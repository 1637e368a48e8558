// src/auth.rs

//! Authorization header derivation
//!
//! Credentials live outside this crate (keychain, netrc, environment); a
//! provider hands back the pair recorded for a registry URL and the client
//! derives the `Authorization` header from the registry's configured
//! authentication kind.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use url::Url;

use crate::config::AuthenticationKind;

/// Source of credentials for registry URLs
pub trait AuthorizationProvider: Send + Sync {
    /// The (user, secret) pair recorded for a registry URL, if any. For
    /// token authentication the secret is the token and the user is
    /// ignored.
    fn credentials(&self, url: &Url) -> Option<(String, String)>;
}

/// Fixed credential map keyed by URL origin, mainly for tests and simple
/// setups
#[derive(Debug, Default)]
pub struct StaticAuthorizationProvider {
    entries: HashMap<String, (String, String)>,
}

impl StaticAuthorizationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, url: &Url, user: impl Into<String>, secret: impl Into<String>) -> Self {
        self.entries
            .insert(url.origin().ascii_serialization(), (user.into(), secret.into()));
        self
    }
}

impl AuthorizationProvider for StaticAuthorizationProvider {
    fn credentials(&self, url: &Url) -> Option<(String, String)> {
        self.entries.get(&url.origin().ascii_serialization()).cloned()
    }
}

/// Derive the `Authorization` header value for a registry.
pub fn authorization_header(
    kind: AuthenticationKind,
    user: &str,
    secret: &str,
) -> Option<String> {
    match kind {
        AuthenticationKind::None => None,
        AuthenticationKind::Basic => {
            Some(format!("Basic {}", BASE64.encode(format!("{user}:{secret}"))))
        }
        AuthenticationKind::Token => Some(format!("Bearer {secret}")),
    }
}
