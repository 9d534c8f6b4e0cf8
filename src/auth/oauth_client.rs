use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::Query, response::Html, routing::get, Router};
use oauth2::{
    basic::{
        BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
        BasicTokenIntrospectionResponse, BasicTokenResponse,
    },
    AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, StandardRevocableToken,
    TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::auth::discovery::AuthServerMetadata;
use crate::auth::registration::{ClientMetadata, ClientRegistration, DynamicRegistrar};
use crate::error::{Error, Result};

/// How long [`OAuthClient::authorize`] waits for the user to complete the
/// browser authorization before the flow fails with [`Error::Timeout`].
pub const DEFAULT_AUTHORIZATION_WAIT: Duration = Duration::from_secs(300);

/// Static client configuration for one authorization server.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Build a configuration from discovered server metadata and a dynamic
    /// registration response.
    pub fn from_registration(
        server: &AuthServerMetadata,
        registration: &ClientRegistration,
        redirect_url: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: registration.client_id.clone(),
            auth_url: server.authorization_endpoint.clone(),
            token_url: server.token_endpoint.clone(),
            redirect_url: redirect_url.into(),
            scopes,
        }
    }
}

/// Access credential obtained from the token endpoint. Held in memory for
/// the session, never persisted.
#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<Instant>,
}

type ConfiguredClient = oauth2::Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Drives the authorization code + PKCE flow for a public client.
///
/// Each authorization attempt generates a fresh PKCE verifier/challenge pair
/// and a fresh state value; the verifier leaves this process only in the
/// final token exchange. A failed attempt is terminal - restart from
/// [`OAuthClient::authorization_url`] rather than resuming, since the state
/// value is bound to the one authorization URL shown to the user.
pub struct OAuthClient {
    client: ConfiguredClient,
    http_client: reqwest::Client,
    config: OAuthConfig,
    token: Arc<RwLock<Option<OAuthToken>>>,
    refresh_lock: Arc<Mutex<()>>,
    pkce_verifier: Option<PkceCodeVerifier>,
    state: Option<CsrfToken>,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(config.auth_url.clone())
                    .map_err(|e| Error::InvalidConfiguration(format!("invalid auth URL: {e}")))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url.clone())
                    .map_err(|e| Error::InvalidConfiguration(format!("invalid token URL: {e}")))?,
            )
            .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone()).map_err(|e| {
                Error::InvalidConfiguration(format!("invalid redirect URL: {e}"))
            })?);

        Ok(Self {
            client,
            http_client: reqwest::Client::new(),
            config,
            token: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            pkce_verifier: None,
            state: None,
        })
    }

    /// Register a client with the authorization server and create an
    /// [`OAuthClient`] from the result.
    pub async fn register(
        server: &AuthServerMetadata,
        client_name: impl Into<String>,
        redirect_url: impl Into<String>,
        scopes: Vec<String>,
    ) -> Result<Self> {
        let redirect_url = redirect_url.into();
        let metadata = ClientMetadata::new(client_name, redirect_url.clone())
            .with_scopes(scopes.clone())
            .with_software_info("mcp-greet", env!("CARGO_PKG_VERSION"));

        let registration = DynamicRegistrar::new().register(server, metadata).await?;
        Self::new(OAuthConfig::from_registration(
            server,
            &registration,
            redirect_url,
            scopes,
        ))
    }

    /// Generate the authorization URL for a fresh attempt.
    ///
    /// Generates a new PKCE pair and state value, discarding any previous
    /// attempt's values.
    pub fn authorization_url(&mut self) -> (Url, CsrfToken) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        self.pkce_verifier = Some(pkce_verifier);

        let mut auth_request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.config.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (url, state) = auth_request.url();
        self.state = Some(state.clone());
        (url, state)
    }

    /// Exchange an authorization code for a token.
    ///
    /// The returned `state` must exactly equal the one generated for this
    /// attempt; any mismatch fails with [`Error::StateMismatch`] before a
    /// token request is sent.
    pub async fn exchange_code(&mut self, code: String, state: String) -> Result<OAuthToken> {
        let expected_state = self.state.take().ok_or_else(|| {
            Error::InvalidConfiguration("authorization flow not started".to_string())
        })?;

        if state != *expected_state.secret() {
            return Err(Error::StateMismatch);
        }

        let pkce_verifier = self.pkce_verifier.take().ok_or_else(|| {
            Error::InvalidConfiguration("no PKCE verifier for this attempt".to_string())
        })?;

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client)
            .await
            .map_err(|e| {
                if let oauth2::RequestTokenError::ServerResponse(resp) = &e {
                    match resp.error_description() {
                        Some(description) => {
                            Error::TokenExchange(format!("{}: {}", resp.error(), description))
                        }
                        None => Error::TokenExchange(resp.error().to_string()),
                    }
                } else {
                    Error::TokenExchange(e.to_string())
                }
            })?;

        let token = OAuthToken {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
            scope: token_result
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ")),
            expires_at: token_result.expires_in().map(|d| Instant::now() + d),
        };

        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Run the full interactive authorization: open the browser, wait for
    /// the one-shot callback, and exchange the code.
    ///
    /// The callback listener binds `127.0.0.1:<port>` and the wait is
    /// bounded; an expired wait tears the listener down and fails with
    /// [`Error::Timeout`].
    pub async fn authorize(&mut self, port: u16, wait: Duration) -> Result<OAuthToken> {
        let (auth_url, _state) = self.authorization_url();

        info!("opening browser for authorization");
        if let Err(e) = webbrowser::open(auth_url.as_str()) {
            warn!(error = %e, "could not open browser, visit the URL manually");
            eprintln!("Please visit: {auth_url}");
        }

        let callback = CallbackServer::new(port);
        let (code, state) = callback.wait_for_callback(wait).await?;

        info!("authorization code received, exchanging for token");
        self.exchange_code(code, state).await
    }

    /// Return the held access token, refreshing it first if it has expired
    /// and a refresh token is available.
    pub async fn get_valid_token(&self) -> Result<String> {
        let now = Instant::now();
        {
            let token_guard = self.token.read().await;
            if let Some(token) = &*token_guard {
                if token.expires_at.map(|exp| exp > now).unwrap_or(true) {
                    return Ok(token.access_token.clone());
                }
            } else {
                return Err(Error::InvalidConfiguration(
                    "no access token held; run the authorization flow first".to_string(),
                ));
            }
        }

        let _refresh_guard = self.refresh_lock.lock().await;

        // Re-check after taking the lock in case another task refreshed
        let refresh_token = {
            let token_guard = self.token.read().await;
            match &*token_guard {
                Some(token) if token.expires_at.map(|exp| exp > now).unwrap_or(true) => {
                    return Ok(token.access_token.clone());
                }
                Some(token) => token.refresh_token.clone(),
                None => None,
            }
        };

        match refresh_token {
            Some(refresh_token) => self.refresh_token_inner(&refresh_token).await,
            None => Err(Error::TokenExchange(
                "access token expired and no refresh token held".to_string(),
            )),
        }
    }

    async fn refresh_token_inner(&self, refresh_token: &str) -> Result<String> {
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let token_result = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http_client)
            .await
            .map_err(|e| Error::TokenExchange(format!("token refresh failed: {e}")))?;

        let token = OAuthToken {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
            scope: token_result
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ")),
            expires_at: token_result.expires_in().map(|d| Instant::now() + d),
        };

        let access_token = token.access_token.clone();
        *self.token.write().await = Some(token);
        Ok(access_token)
    }

    /// Install a token obtained out of band (tests, pre-provisioned tokens).
    pub async fn set_token(&self, token: OAuthToken) {
        *self.token.write().await = Some(token);
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// One-shot local listener for the authorization redirect.
///
/// Owns a bound socket for the duration of exactly one `/callback` request;
/// the socket is closed on success, denial, or timeout. This is not a
/// general-purpose server.
pub struct CallbackServer {
    port: u16,
}

impl CallbackServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Wait for the authorization redirect, at most `wait` long.
    ///
    /// Returns the `code` and `state` query parameters of the first request
    /// to `/callback`. A callback carrying an `error` parameter fails with
    /// [`Error::AuthorizationDenied`]; an expired wait fails with
    /// [`Error::Timeout`].
    pub async fn wait_for_callback(&self, wait: Duration) -> Result<(String, String)> {
        let (tx, rx) = oneshot::channel::<Result<(String, String)>>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let callback_handler = {
            let tx = tx.clone();
            move |Query(params): Query<CallbackQuery>| {
                let tx = tx.clone();
                async move {
                    let (outcome, page) = match params {
                        CallbackQuery {
                            error: Some(error),
                            error_description,
                            ..
                        } => {
                            let detail = match error_description {
                                Some(description) => format!("{error}: {description}"),
                                None => error,
                            };
                            (Err(Error::AuthorizationDenied(detail)), DENIED_HTML)
                        }
                        CallbackQuery {
                            code: Some(code),
                            state: Some(state),
                            ..
                        } => (Ok((code, state)), SUCCESS_HTML),
                        _ => (
                            Err(Error::Transport(
                                "authorization callback missing code or state".to_string(),
                            )),
                            DENIED_HTML,
                        ),
                    };

                    if let Some(sender) = tx.lock().await.take() {
                        let _ = sender.send(outcome);
                    }
                    Html(page)
                }
            }
        };

        let app = Router::new().route("/callback", get(callback_handler));

        let addr = format!("127.0.0.1:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Transport(format!("failed to bind to {addr}: {e}")))?;

        let server_handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let outcome = match tokio::time::timeout(wait, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::Transport(
                "callback listener closed unexpectedly".to_string(),
            )),
            Err(_) => Err(Error::Timeout),
        };

        // Let the response to the browser flush before the socket goes away
        if outcome.is_ok() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        server_handle.abort();

        outcome
    }
}

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Successful</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background-color: #f5f5f5;
        }
        .container {
            text-align: center;
            padding: 2rem;
            background: white;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }
        h1 { color: #22c55e; }
        p { color: #666; margin-top: 1rem; }
    </style>
</head>
<body>
    <div class="container">
        <h1>&#10003; Authorization Successful</h1>
        <p>You can now close this window and return to your terminal.</p>
    </div>
</body>
</html>"#;

const DENIED_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Failed</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background-color: #f5f5f5;
        }
        .container {
            text-align: center;
            padding: 2rem;
            background: white;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }
        h1 { color: #ef4444; }
        p { color: #666; margin-top: 1rem; }
    </style>
</head>
<body>
    <div class="container">
        <h1>&#10007; Authorization Failed</h1>
        <p>The authorization was not completed. Close this window and check your terminal.</p>
    </div>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use sha2::{Digest, Sha256};

    fn test_config() -> OAuthConfig {
        OAuthConfig {
            client_id: "test_client_id".to_string(),
            auth_url: "https://auth.example.com/authorize".to_string(),
            token_url: "https://auth.example.com/token".to_string(),
            redirect_url: "http://localhost:8080/callback".to_string(),
            scopes: vec!["greet".to_string()],
        }
    }

    #[test]
    fn test_challenge_derivable_from_verifier() {
        let mut client = OAuthClient::new(test_config()).unwrap();
        let (url, _state) = client.authorization_url();

        let challenge = url
            .query_pairs()
            .find(|(k, _)| k == "code_challenge")
            .map(|(_, v)| v.to_string())
            .expect("authorization URL missing code_challenge");

        let verifier = client.pkce_verifier.as_ref().unwrap();
        let digest = Sha256::digest(verifier.secret().as_bytes());
        let derived = URL_SAFE_NO_PAD.encode(digest);

        assert_eq!(derived, challenge);
    }

    #[test]
    fn test_fresh_pair_per_attempt() {
        let mut client = OAuthClient::new(test_config()).unwrap();

        let (first, _) = client.authorization_url();
        let first_verifier = client.pkce_verifier.as_ref().unwrap().secret().clone();
        let (second, _) = client.authorization_url();
        let second_verifier = client.pkce_verifier.as_ref().unwrap().secret().clone();

        assert_ne!(first_verifier, second_verifier);
        assert_ne!(first.as_str(), second.as_str());
    }

    #[tokio::test]
    async fn test_exchange_without_flow_fails() {
        let mut client = OAuthClient::new(test_config()).unwrap();
        let result = client
            .exchange_code("code".to_string(), "state".to_string())
            .await;
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_state_mismatch_is_fatal() {
        let mut client = OAuthClient::new(test_config()).unwrap();
        let (_url, _state) = client.authorization_url();

        let result = client
            .exchange_code("code".to_string(), "not-the-state".to_string())
            .await;
        assert!(matches!(result, Err(Error::StateMismatch)));

        // The attempt is consumed; a retry with the right state is also
        // rejected until a new authorization URL is generated.
        let result = client
            .exchange_code("code".to_string(), "anything".to_string())
            .await;
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }
}
