use std::time::Duration;

use axum::{routing::post, Json, Router};
use mcp_greet::auth::{CallbackServer, OAuthClient, OAuthConfig};
use mcp_greet::Error;
use serde_json::json;
use tokio::time::timeout;

fn test_config() -> OAuthConfig {
    OAuthConfig {
        client_id: "test_client_id".to_string(),
        auth_url: "https://auth.example.com/authorize".to_string(),
        token_url: "https://auth.example.com/token".to_string(),
        redirect_url: "http://localhost:8080/callback".to_string(),
        scopes: vec!["greet".to_string()],
    }
}

#[tokio::test]
async fn test_authorization_url_contents() {
    let mut oauth_client = OAuthClient::new(test_config()).unwrap();
    let (auth_url, state) = oauth_client.authorization_url();

    let url_str = auth_url.as_str();
    assert!(url_str.starts_with("https://auth.example.com/authorize?"));
    assert!(url_str.contains("client_id=test_client_id"));
    assert!(url_str.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
    assert!(url_str.contains("response_type=code"));
    assert!(url_str.contains("state="));
    assert!(url_str.contains("code_challenge="));
    assert!(url_str.contains("code_challenge_method=S256"));
    assert!(url_str.contains("scope=greet"));

    assert!(!state.secret().is_empty());
}

#[tokio::test]
async fn test_callback_server_receives_code() {
    let server = CallbackServer::new(18471);

    let client_task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let _ = client
            .get("http://127.0.0.1:18471/callback?code=test_code&state=test_state")
            .send()
            .await;
    });

    let result = timeout(
        Duration::from_secs(5),
        server.wait_for_callback(Duration::from_secs(5)),
    )
    .await;

    match result {
        Ok(Ok((code, state))) => {
            assert_eq!(code, "test_code");
            assert_eq!(state, "test_state");
        }
        Ok(Err(e)) => panic!("callback server error: {e}"),
        Err(_) => panic!("callback server timed out"),
    }

    let _ = client_task.await;
}

#[tokio::test]
async fn test_callback_with_error_denies_flow() {
    let server = CallbackServer::new(18472);

    let client_task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let _ = client
            .get("http://127.0.0.1:18472/callback?error=access_denied&error_description=user%20said%20no")
            .send()
            .await;
    });

    let result = server.wait_for_callback(Duration::from_secs(5)).await;
    match result {
        Err(Error::AuthorizationDenied(detail)) => {
            assert!(detail.contains("access_denied"));
            assert!(detail.contains("user said no"));
        }
        other => panic!("expected AuthorizationDenied, got {other:?}"),
    }

    let _ = client_task.await;
}

#[tokio::test]
async fn test_callback_wait_is_bounded() {
    let server = CallbackServer::new(18473);

    let result = server.wait_for_callback(Duration::from_millis(200)).await;
    assert!(matches!(result, Err(Error::Timeout)));

    // The socket is released; a fresh listener can bind the same port
    tokio::time::sleep(Duration::from_millis(100)).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:18473").await;
    assert!(listener.is_ok());
}

#[tokio::test]
async fn test_full_code_exchange_loop() {
    // Mock token endpoint: accepts the exchange and returns a token
    let token_app = Router::new().route(
        "/token",
        post(|| async {
            Json(json!({
                "access_token": "tok-1",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "r1",
                "scope": "greet"
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let token_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, token_app).await.unwrap();
    });

    let config = OAuthConfig {
        client_id: "test_client_id".to_string(),
        auth_url: "https://auth.example.com/authorize".to_string(),
        token_url: format!("http://{token_addr}/token"),
        redirect_url: "http://localhost:18474/callback".to_string(),
        scopes: vec!["greet".to_string()],
    };
    let mut oauth_client = OAuthClient::new(config).unwrap();
    let (_auth_url, state) = oauth_client.authorization_url();

    // Simulate the authorization server redirecting the user agent back
    let callback = CallbackServer::new(18474);
    let redirect_state = state.secret().clone();
    let client_task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let _ = client
            .get(format!(
                "http://127.0.0.1:18474/callback?code=auth_code_1&state={redirect_state}"
            ))
            .send()
            .await;
    });

    let (code, returned_state) = callback
        .wait_for_callback(Duration::from_secs(5))
        .await
        .unwrap();
    let token = oauth_client
        .exchange_code(code, returned_state)
        .await
        .unwrap();

    assert_eq!(token.access_token, "tok-1");
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    assert_eq!(token.scope.as_deref(), Some("greet"));
    assert!(token.expires_at.is_some());

    let _ = client_task.await;
}

#[tokio::test]
async fn test_preconfigured_token_is_returned() {
    let oauth_client = OAuthClient::new(test_config()).unwrap();

    oauth_client
        .set_token(mcp_greet::auth::OAuthToken {
            access_token: "preset".to_string(),
            refresh_token: None,
            scope: None,
            expires_at: Some(std::time::Instant::now() + Duration::from_secs(3600)),
        })
        .await;

    assert_eq!(oauth_client.get_valid_token().await.unwrap(), "preset");
}

#[tokio::test]
async fn test_expired_token_without_refresh_fails() {
    let oauth_client = OAuthClient::new(test_config()).unwrap();

    oauth_client
        .set_token(mcp_greet::auth::OAuthToken {
            access_token: "stale".to_string(),
            refresh_token: None,
            scope: None,
            expires_at: Some(std::time::Instant::now() - Duration::from_secs(1)),
        })
        .await;

    let result = oauth_client.get_valid_token().await;
    assert!(matches!(result, Err(Error::TokenExchange(_))));
}
