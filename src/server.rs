use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::auth::{require_bearer, BearerAuth, VerifiedClaims};
use crate::error::{Error, Result};
use crate::tools::{ToolHandler, ToolRegistry};

/// The built-in demonstration tool: greets the argument `name` and names
/// the authenticated caller.
pub struct GreetTool;

#[async_trait]
impl ToolHandler for GreetTool {
    async fn call(&self, claims: &VerifiedClaims, arguments: Value) -> Result<Value> {
        let name = arguments
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("world");
        let caller = claims.subject().unwrap_or("anonymous");
        Ok(json!({
            "greeting": format!("Hello, {name}! You are authenticated as {caller}.")
        }))
    }
}

#[derive(Clone)]
struct AppState {
    registry: Arc<ToolRegistry>,
    issuer: String,
    resource: String,
}

/// The greet service: a tool registry served over HTTP behind bearer
/// authentication.
///
/// Public routes: `/healthz` and the protected-resource metadata document.
/// Protected routes: `GET /tools` and `POST /tools/:name`.
pub struct GreetServer {
    registry: ToolRegistry,
    auth: BearerAuth,
    issuer: String,
    resource: String,
}

/// A running server: the bound address and the serve task.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<()>>,
}

impl GreetServer {
    pub fn new(auth: BearerAuth, issuer: impl Into<String>, resource: impl Into<String>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register("greet", "Greet the caller by name", GreetTool);

        Self {
            registry,
            auth,
            issuer: issuer.into(),
            resource: resource.into(),
        }
    }

    /// Register an additional tool alongside the built-in `greet`.
    pub fn register_tool(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) {
        self.registry.register(name, description, handler);
    }

    pub fn router(self) -> Router {
        let state = AppState {
            registry: Arc::new(self.registry),
            issuer: self.issuer,
            resource: self.resource,
        };

        let protected = Router::new()
            .route("/tools", get(list_tools))
            .route("/tools/:name", post(call_tool))
            .layer(middleware::from_fn_with_state(
                self.auth.clone(),
                require_bearer,
            ))
            .with_state(state.clone());

        let public = Router::new()
            .route("/healthz", get(healthz))
            .route(
                "/.well-known/oauth-protected-resource",
                get(resource_metadata),
            )
            .with_state(state);

        public.merge(protected).layer(CorsLayer::permissive())
    }

    /// Bind and serve. Returns once the listener is bound, with the actual
    /// address (useful with port 0) and the serve task handle.
    pub async fn serve(self, bind_addr: &str) -> Result<ServerHandle> {
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::Transport(format!("failed to bind to {bind_addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("failed to get local address: {e}")))?;

        let router = self.router();
        info!(%addr, "greet server listening");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .map_err(|e| Error::Transport(format!("server error: {e}")))
        });

        Ok(ServerHandle { addr, handle })
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Protected-resource metadata pointing clients at the authorization server.
async fn resource_metadata(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "resource": state.resource,
        "authorization_servers": [state.issuer],
        "bearer_methods_supported": ["header"],
    }))
}

async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tools": state.registry.list() }))
}

#[derive(Debug, Deserialize)]
struct CallToolBody {
    #[serde(default)]
    arguments: Value,
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(claims): Extension<VerifiedClaims>,
    Json(body): Json<CallToolBody>,
) -> Response {
    match state.registry.call(&name, &claims, body.arguments).await {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(Error::ToolNotFound(name)) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "tool_not_found",
                "error_description": format!("no tool named {name}"),
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "tool_failed",
                "error_description": e.to_string(),
            })),
        )
            .into_response(),
    }
}
