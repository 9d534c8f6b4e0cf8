use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::discovery::AuthServerMetadata;
use crate::error::{Error, Result};

/// Client metadata for dynamic registration as per RFC 7591.
///
/// The constructor fills in the shape this crate always registers with: a
/// public client using the authorization code grant with no client secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Human-readable name of the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Array of redirection URIs for use in redirect-based flows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<String>>,

    /// OAuth 2.0 grant types the client can use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,

    /// OAuth 2.0 response types the client can use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,

    /// OAuth 2.0 scope values that the client can use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Authentication method for the token endpoint; "none" for public clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    /// Software ID for the client software
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,

    /// Version of the client software
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,

    /// Additional metadata fields
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl ClientMetadata {
    /// Create metadata for a public authorization-code client with a single
    /// redirect URI.
    pub fn new(client_name: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_name: Some(client_name.into()),
            redirect_uris: Some(vec![redirect_uri.into()]),
            grant_types: Some(vec!["authorization_code".to_string()]),
            response_types: Some(vec!["code".to_string()]),
            scope: None,
            token_endpoint_auth_method: Some("none".to_string()),
            software_id: None,
            software_version: None,
            additional: HashMap::new(),
        }
    }

    /// Set the scopes
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        if !scopes.is_empty() {
            self.scope = Some(scopes.join(" "));
        }
        self
    }

    /// Set the software information
    pub fn with_software_info(
        mut self,
        software_id: impl Into<String>,
        software_version: impl Into<String>,
    ) -> Self {
        self.software_id = Some(software_id.into());
        self.software_version = Some(software_version.into());
        self
    }
}

/// Successful response from the registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    /// The server-assigned client identifier
    pub client_id: String,

    /// A client secret, if the server issued one despite the public-client
    /// registration. Unused by this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Time at which the client identifier was issued (seconds since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<u64>,

    /// All registered metadata echoed back by the server
    #[serde(flatten)]
    pub metadata: ClientMetadata,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistrationErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Registers a client with an authorization server at runtime.
///
/// Registration is a one-time per-session operation and is never retried;
/// a duplicate registration against a server without deduplication would
/// leak client records.
pub struct DynamicRegistrar {
    http_client: reqwest::Client,
}

impl Default for DynamicRegistrar {
    fn default() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }
}

impl DynamicRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client using the registration endpoint named in the
    /// server's metadata.
    ///
    /// Fails with [`Error::RegistrationUnsupported`] before any request is
    /// sent if the metadata carries no registration endpoint.
    pub async fn register(
        &self,
        server: &AuthServerMetadata,
        metadata: ClientMetadata,
    ) -> Result<ClientRegistration> {
        let endpoint = server
            .registration_endpoint
            .as_deref()
            .ok_or(Error::RegistrationUnsupported)?;

        debug!(endpoint = %endpoint, "registering client");

        let response = self
            .http_client
            .post(endpoint)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Registration(format!("failed to reach {endpoint}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let registration = response
                .json::<ClientRegistration>()
                .await
                .map_err(|e| Error::Registration(format!("invalid registration response: {e}")))?;
            info!(client_id = %registration.client_id, "client registered");
            Ok(registration)
        } else {
            match response.json::<RegistrationErrorBody>().await {
                Ok(body) => Err(Error::Registration(format!(
                    "{} - {}",
                    body.error,
                    body.error_description.unwrap_or_default()
                ))),
                Err(_) => Err(Error::Registration(format!(
                    "registration endpoint returned status {status}"
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_metadata_creation() {
        let metadata = ClientMetadata::new("Test Client", "http://localhost:8080/callback")
            .with_scopes(vec!["greet".to_string(), "profile".to_string()]);

        assert_eq!(metadata.client_name, Some("Test Client".to_string()));
        assert_eq!(
            metadata.redirect_uris,
            Some(vec!["http://localhost:8080/callback".to_string()])
        );
        assert_eq!(metadata.scope, Some("greet profile".to_string()));
        assert_eq!(
            metadata.grant_types,
            Some(vec!["authorization_code".to_string()])
        );
        assert_eq!(metadata.token_endpoint_auth_method, Some("none".to_string()));
    }

    #[test]
    fn test_client_metadata_serialization() {
        let metadata = ClientMetadata::new("Test Client", "http://localhost:8080/callback");

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"client_name\":\"Test Client\""));
        assert!(json.contains("\"redirect_uris\":[\"http://localhost:8080/callback\"]"));
        assert!(json.contains("\"token_endpoint_auth_method\":\"none\""));
        assert!(!json.contains("software_id"));
    }

    #[test]
    fn test_registration_response_parsing() {
        let json = r#"{
            "client_id": "abc123",
            "client_id_issued_at": 1700000000,
            "client_name": "Test Client",
            "redirect_uris": ["http://localhost:8080/callback"]
        }"#;

        let registration: ClientRegistration = serde_json::from_str(json).unwrap();
        assert_eq!(registration.client_id, "abc123");
        assert_eq!(registration.client_id_issued_at, Some(1700000000));
        assert_eq!(
            registration.metadata.client_name,
            Some("Test Client".to_string())
        );
    }
}
