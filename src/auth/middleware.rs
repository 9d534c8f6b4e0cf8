use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::auth::verifier::TokenVerifier;

/// Shared state for the bearer authentication middleware.
///
/// The unauthenticated response carries a `WWW-Authenticate` challenge
/// naming the authorization endpoint so compliant clients can self-discover
/// where to authenticate, and a JSON body whose `error` code distinguishes
/// a missing credential from an invalid one.
#[derive(Clone)]
pub struct BearerAuth {
    verifier: TokenVerifier,
    realm: String,
    authorization_uri: String,
}

#[derive(Debug, Serialize)]
struct AuthErrorBody {
    error: &'static str,
    error_description: String,
    authorization_uri: String,
}

impl BearerAuth {
    pub fn new(
        verifier: TokenVerifier,
        realm: impl Into<String>,
        authorization_uri: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            realm: realm.into(),
            authorization_uri: authorization_uri.into(),
        }
    }

    pub fn authorization_uri(&self) -> &str {
        &self.authorization_uri
    }

    fn challenge(&self) -> HeaderValue {
        let value = format!(
            "Bearer realm=\"{}\", authorization_uri=\"{}\"",
            self.realm, self.authorization_uri
        );
        HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
    }

    fn unauthorized(&self, error: &'static str, description: String) -> Response {
        let body = AuthErrorBody {
            error,
            error_description: description,
            authorization_uri: self.authorization_uri.clone(),
        };
        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, self.challenge());
        response
    }
}

/// Middleware guarding protected routes.
///
/// On success the request proceeds with [`VerifiedClaims`] inserted into its
/// extensions; every failure maps to a 401 response and never crashes the
/// pipeline or lets the request through.
///
/// [`VerifiedClaims`]: crate::auth::verifier::VerifiedClaims
pub async fn require_bearer(
    State(auth): State<BearerAuth>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(&request) {
        Some(token) => token.to_string(),
        None => {
            debug!("request without bearer credential");
            return auth.unauthorized("unauthorized", "missing bearer token".to_string());
        }
    };

    match auth.verifier.verify(&token).await {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, "bearer token rejected");
            auth.unauthorized("invalid_token", e.to_string())
        }
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_authorization(value: &str) -> Request {
        axum::http::Request::builder()
            .uri("/tools")
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_bearer_token_extraction() {
        let request = request_with_authorization("Bearer abc.def.ghi");
        assert_eq!(bearer_token(&request), Some("abc.def.ghi"));

        let request = request_with_authorization("bearer lowercase-scheme");
        assert_eq!(bearer_token(&request), Some("lowercase-scheme"));
    }

    #[test]
    fn test_non_bearer_schemes_rejected() {
        let request = request_with_authorization("Basic dXNlcjpwYXNz");
        assert_eq!(bearer_token(&request), None);

        let request = request_with_authorization("Bearer ");
        assert_eq!(bearer_token(&request), None);

        let request = axum::http::Request::builder()
            .uri("/tools")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);
    }
}
