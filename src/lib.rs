//! # mcp-greet
//!
//! An OAuth-protected greeting tool service, in two halves:
//!
//! - a resource server exposing a small tool registry over HTTP, where every
//!   protected route requires a `Bearer` token verified against the
//!   authorization server's published key set, and
//! - a client that establishes trust at runtime: well-known metadata
//!   discovery, dynamic client registration, and the authorization code +
//!   PKCE flow with a one-shot local callback listener.
//!
//! The MCP transport itself is out of scope here; the tool surface is plain
//! HTTP JSON so the trust-establishment protocol stays the whole story.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use mcp_greet::{
//!     auth::{BearerAuth, KeyResolver, MetadataDiscoverer, TokenVerifier},
//!     GreetServer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metadata = MetadataDiscoverer::new()
//!         .discover("https://auth.example.com")
//!         .await?;
//!
//!     let resolver = KeyResolver::new(metadata.jwks_uri.clone());
//!     let verifier = TokenVerifier::new(metadata.issuer.clone(), resolver);
//!     let auth = BearerAuth::new(verifier, "greet", metadata.authorization_endpoint.clone());
//!
//!     let server = GreetServer::new(auth, metadata.issuer, "http://127.0.0.1:3000");
//!     let running = server.serve("127.0.0.1:3000").await?;
//!     running.handle.await??;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod server;
mod tools;

pub mod auth;

pub use config::AuthConfig;
pub use error::{Error, Result};
pub use server::{GreetServer, GreetTool, ServerHandle};
pub use tools::{ToolHandler, ToolInfo, ToolRegistry};
