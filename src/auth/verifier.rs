use std::collections::HashMap;

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::jwks::KeyResolver;
use crate::error::{Error, Result};

/// The `aud` claim is a single string or an array of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

/// Decoded and validated payload of a bearer token. Created per request and
/// scoped to it; never shared across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedClaims {
    pub iss: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl VerifiedClaims {
    /// Space-separated `scope` claim split into individual scopes.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// The identity to attribute the request to: `sub`, falling back to
    /// `client_id` for client-credential style tokens.
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().or(self.client_id.as_deref())
    }
}

/// Validates bearer tokens against a pinned issuer using keys resolved from
/// the issuer's key set.
///
/// The algorithm named in a token header is only ever matched against the
/// configured allow-list; it is never trusted on its own. Safe to share and
/// call concurrently.
#[derive(Clone)]
pub struct TokenVerifier {
    issuer: String,
    resolver: KeyResolver,
    allowed_algorithms: Vec<Algorithm>,
    audience: Option<String>,
}

impl TokenVerifier {
    pub fn new(issuer: impl Into<String>, resolver: KeyResolver) -> Self {
        Self {
            issuer: issuer.into(),
            resolver,
            allowed_algorithms: vec![Algorithm::RS256, Algorithm::ES256],
            audience: None,
        }
    }

    /// Replace the algorithm allow-list. Asymmetric algorithms only.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    /// Additionally require an exact `aud` claim match.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify a raw bearer token and return its validated claims.
    ///
    /// A token that is not three dot-separated segments, has an unparsable
    /// header, or carries no `kid` fails with [`Error::MalformedToken`]
    /// before any key-set fetch is attempted.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims> {
        let header = decode_header(token)
            .map_err(|e| Error::MalformedToken(format!("invalid token header: {e}")))?;

        if !self.allowed_algorithms.contains(&header.alg) {
            return Err(Error::SignatureInvalid(format!(
                "algorithm {:?} is not allowed",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| Error::MalformedToken("token header has no key id".to_string()))?;

        let key = self.resolver.resolve(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<VerifiedClaims>(token, &key, &validation)
            .map_err(map_validation_error)?;

        debug!(
            issuer = %self.issuer,
            subject = ?token_data.claims.sub,
            kid = %kid,
            "bearer token verified"
        );

        Ok(token_data.claims)
    }
}

fn map_validation_error(e: jsonwebtoken::errors::Error) -> Error {
    use jsonwebtoken::errors::ErrorKind;

    match e.kind() {
        ErrorKind::ExpiredSignature => Error::TokenExpired,
        ErrorKind::InvalidIssuer => Error::IssuerMismatch,
        ErrorKind::InvalidSignature => {
            Error::SignatureInvalid("signature verification failed".to_string())
        }
        _ => Error::MalformedToken(format!("token validation failed: {e}")),
    }
}
