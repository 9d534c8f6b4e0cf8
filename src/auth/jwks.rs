use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Fetches and caches signing keys from a remote key-set endpoint.
///
/// Keys are cached by `kid` for the process lifetime; a miss fetches the
/// full key set and re-indexes it. There is no TTL - a rotated key carries a
/// new `kid`, which misses the cache and triggers a fresh fetch. Concurrent
/// misses for the same `kid` may fetch more than once, which is harmless.
/// The cache lock is never held across the network call.
#[derive(Clone)]
pub struct KeyResolver {
    jwks_uri: String,
    http_client: reqwest::Client,
    keys: Arc<RwLock<HashMap<String, Arc<DecodingKey>>>>,
}

impl KeyResolver {
    pub fn new(jwks_uri: impl Into<String>) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            http_client: reqwest::Client::new(),
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Return the decoding key for `kid`, fetching the key set on a miss.
    ///
    /// Fails with [`Error::KeyNotFound`] when `kid` is absent from the
    /// freshly fetched set, and [`Error::KeySetFetch`] when the endpoint is
    /// unreachable or returns invalid data.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<DecodingKey>> {
        {
            let keys = self.keys.read().await;
            if let Some(key) = keys.get(kid) {
                debug!(kid = %kid, "signing key cache hit");
                return Ok(Arc::clone(key));
            }
        }

        let jwk_set = self.fetch_key_set().await?;

        let mut fresh = HashMap::new();
        let mut resolved = None;
        for jwk in &jwk_set.keys {
            let Some(id) = jwk.common.key_id.clone() else {
                continue;
            };
            let key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => Arc::new(key),
                Err(e) => {
                    warn!(kid = %id, error = %e, "skipping unusable key in key set");
                    continue;
                }
            };
            if id == kid {
                resolved = Some(Arc::clone(&key));
            }
            fresh.insert(id, key);
        }

        {
            let mut keys = self.keys.write().await;
            keys.extend(fresh);
        }

        resolved.ok_or_else(|| Error::KeyNotFound(kid.to_string()))
    }

    async fn fetch_key_set(&self) -> Result<JwkSet> {
        info!(jwks_uri = %self.jwks_uri, "fetching key set");

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| Error::KeySetFetch(format!("failed to reach {}: {e}", self.jwks_uri)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::KeySetFetch(format!(
                "{} returned status {status}",
                self.jwks_uri
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| Error::KeySetFetch(format!("invalid key set document: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fetch_error() {
        // Port 1 is never bound in the test environment
        let resolver = KeyResolver::new("http://127.0.0.1:1/jwks");
        let result = resolver.resolve("any").await;
        assert!(matches!(result, Err(Error::KeySetFetch(_))));
    }

    #[test]
    fn test_resolver_is_cheap_to_share() {
        let resolver = KeyResolver::new("http://127.0.0.1:1/jwks");
        let clone = resolver.clone();
        assert!(Arc::ptr_eq(&resolver.keys, &clone.keys));
    }
}
