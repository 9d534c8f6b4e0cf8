use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// OAuth 2.0 Authorization Server Metadata path (RFC 8414)
pub const OAUTH_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// OpenID Connect discovery document path, used as a fallback for servers
/// that only publish OIDC metadata
pub const OIDC_METADATA_PATH: &str = "/.well-known/openid-configuration";

/// Authorization server metadata as published in a well-known discovery
/// document. Fetched once per session and treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthServerMetadata {
    /// Issuer identifier, also the value expected in token `iss` claims
    pub issuer: String,

    /// Endpoint the user agent is sent to for authorization
    pub authorization_endpoint: String,

    /// Endpoint codes are exchanged against
    pub token_endpoint: String,

    /// Key-set endpoint used to verify token signatures
    pub jwks_uri: String,

    /// Dynamic client registration endpoint, if the server offers one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
}

/// Resolves an authorization server's endpoints from its well-known
/// discovery documents.
///
/// The RFC 8414 document is tried first, then the OIDC configuration
/// document. The first document that fetches and parses successfully is
/// authoritative; the two are never merged. There are no retries beyond the
/// single fallback, the caller decides whether to repeat the whole
/// operation.
pub struct MetadataDiscoverer {
    http_client: reqwest::Client,
}

impl Default for MetadataDiscoverer {
    fn default() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }
}

impl MetadataDiscoverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch authorization server metadata for the given issuer.
    pub async fn discover(&self, issuer: &str) -> Result<AuthServerMetadata> {
        let base = issuer.trim_end_matches('/');
        let mut last_err = Error::Discovery(format!("no discovery document found for {issuer}"));

        for path in [OAUTH_METADATA_PATH, OIDC_METADATA_PATH] {
            let url = format!("{base}{path}");
            match self.fetch_document(&url).await {
                Ok(metadata) => {
                    debug!(url = %url, issuer = %metadata.issuer, "discovered server metadata");
                    return Ok(metadata);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "metadata document unavailable");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn fetch_document(&self, url: &str) -> Result<AuthServerMetadata> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Discovery(format!("{url} returned status {status}")));
        }

        response
            .json::<AuthServerMetadata>()
            .await
            .map_err(|e| Error::Discovery(format!("invalid metadata document at {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_deserialization_minimal() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": "https://auth.example.com/token",
            "jwks_uri": "https://auth.example.com/jwks"
        }"#;

        let metadata: AuthServerMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.issuer, "https://auth.example.com");
        assert!(metadata.registration_endpoint.is_none());
        assert!(metadata.scopes_supported.is_empty());
    }

    #[test]
    fn test_metadata_ignores_unknown_fields() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": "https://auth.example.com/token",
            "jwks_uri": "https://auth.example.com/jwks",
            "registration_endpoint": "https://auth.example.com/register",
            "code_challenge_methods_supported": ["S256"],
            "userinfo_endpoint": "https://auth.example.com/userinfo"
        }"#;

        let metadata: AuthServerMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(
            metadata.registration_endpoint.as_deref(),
            Some("https://auth.example.com/register")
        );
        assert_eq!(metadata.code_challenge_methods_supported, vec!["S256"]);
    }
}
