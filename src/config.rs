use std::env;

use crate::auth::{AuthServerMetadata, MetadataDiscoverer};
use crate::error::{Error, Result};

const ISSUER_VAR: &str = "MCP_GREET_ISSUER";
const AUTHORIZATION_ENDPOINT_VAR: &str = "MCP_GREET_AUTHORIZATION_ENDPOINT";
const TOKEN_ENDPOINT_VAR: &str = "MCP_GREET_TOKEN_ENDPOINT";
const JWKS_URI_VAR: &str = "MCP_GREET_JWKS_URI";
const REGISTRATION_ENDPOINT_VAR: &str = "MCP_GREET_REGISTRATION_ENDPOINT";

/// Authorization server configuration.
///
/// Only the issuer is required. Endpoint overrides take precedence over
/// discovery; when all of authorization endpoint, token endpoint, and
/// key-set endpoint are given, no discovery request is made at all.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
    pub registration_endpoint: Option<String>,
}

impl AuthConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            authorization_endpoint: None,
            token_endpoint: None,
            jwks_uri: None,
            registration_endpoint: None,
        }
    }

    /// Read the configuration from `MCP_GREET_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let issuer = env::var(ISSUER_VAR)
            .map_err(|_| Error::InvalidConfiguration(format!("{ISSUER_VAR} is not set")))?;

        Ok(Self {
            issuer,
            authorization_endpoint: env::var(AUTHORIZATION_ENDPOINT_VAR).ok(),
            token_endpoint: env::var(TOKEN_ENDPOINT_VAR).ok(),
            jwks_uri: env::var(JWKS_URI_VAR).ok(),
            registration_endpoint: env::var(REGISTRATION_ENDPOINT_VAR).ok(),
        })
    }

    /// Turn the configuration into full server metadata, via discovery when
    /// the explicit overrides do not cover every endpoint.
    pub async fn resolve(&self, discoverer: &MetadataDiscoverer) -> Result<AuthServerMetadata> {
        if let (Some(authorization_endpoint), Some(token_endpoint), Some(jwks_uri)) = (
            self.authorization_endpoint.clone(),
            self.token_endpoint.clone(),
            self.jwks_uri.clone(),
        ) {
            return Ok(AuthServerMetadata {
                issuer: self.issuer.clone(),
                authorization_endpoint,
                token_endpoint,
                jwks_uri,
                registration_endpoint: self.registration_endpoint.clone(),
                response_types_supported: vec!["code".to_string()],
                grant_types_supported: vec!["authorization_code".to_string()],
                code_challenge_methods_supported: vec!["S256".to_string()],
                scopes_supported: Vec::new(),
            });
        }

        let mut metadata = discoverer.discover(&self.issuer).await?;

        // Explicit values still win over discovered ones
        if let Some(authorization_endpoint) = &self.authorization_endpoint {
            metadata.authorization_endpoint = authorization_endpoint.clone();
        }
        if let Some(token_endpoint) = &self.token_endpoint {
            metadata.token_endpoint = token_endpoint.clone();
        }
        if let Some(jwks_uri) = &self.jwks_uri {
            metadata.jwks_uri = jwks_uri.clone();
        }
        if let Some(registration_endpoint) = &self.registration_endpoint {
            metadata.registration_endpoint = Some(registration_endpoint.clone());
        }

        Ok(metadata)
    }
}
