//! OAuth 2.0 trust establishment for the greet service.
//!
//! Two roles live here. The client side drives the authorization code flow
//! with PKCE against a dynamically discovered authorization server:
//! metadata discovery via the well-known documents, RFC 7591 dynamic client
//! registration as a public client, a one-shot local callback listener, and
//! the code-for-token exchange. The server side verifies inbound bearer
//! tokens: signing keys resolved and cached from the issuer's key set,
//! signature/issuer/expiry validation against an algorithm allow-list, and
//! an axum middleware that turns every verification failure into a 401 with
//! a `WWW-Authenticate` challenge.
//!
//! ## Client flow
//!
//! ```no_run
//! use std::time::Duration;
//! use mcp_greet::auth::{MetadataDiscoverer, OAuthClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metadata = MetadataDiscoverer::new()
//!         .discover("https://auth.example.com")
//!         .await?;
//!
//!     let mut client = OAuthClient::register(
//!         &metadata,
//!         "My Greet Client",
//!         "http://localhost:8080/callback",
//!         vec!["greet".to_string()],
//!     )
//!     .await?;
//!
//!     let token = client.authorize(8080, Duration::from_secs(300)).await?;
//!     println!("access token: {}", token.access_token);
//!     Ok(())
//! }
//! ```
//!
//! ## Server pipeline
//!
//! ```no_run
//! use mcp_greet::auth::{BearerAuth, KeyResolver, TokenVerifier};
//!
//! let resolver = KeyResolver::new("https://auth.example.com/jwks");
//! let verifier = TokenVerifier::new("https://auth.example.com", resolver);
//! let auth = BearerAuth::new(verifier, "greet", "https://auth.example.com/authorize");
//! // layer axum routes with `middleware::from_fn_with_state(auth, require_bearer)`
//! ```
//!
//! Standards: OAuth 2.0 (RFC 6749), PKCE (RFC 7636), Dynamic Client
//! Registration (RFC 7591), Authorization Server Metadata (RFC 8414),
//! Bearer Token Usage (RFC 6750).

mod discovery;
mod jwks;
mod middleware;
mod oauth_client;
mod registration;
mod verifier;

pub use discovery::{
    AuthServerMetadata, MetadataDiscoverer, OAUTH_METADATA_PATH, OIDC_METADATA_PATH,
};
pub use jwks::KeyResolver;
pub use middleware::{require_bearer, BearerAuth};
pub use oauth_client::{
    CallbackServer, OAuthClient, OAuthConfig, OAuthToken, DEFAULT_AUTHORIZATION_WAIT,
};
pub use registration::{ClientMetadata, ClientRegistration, DynamicRegistrar};
pub use verifier::{Audience, TokenVerifier, VerifiedClaims};
