use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::VerifiedClaims;
use crate::error::{Error, Result};

/// A callable tool. Handlers receive the verified claims of the caller so
/// greetings and audit trails can name the authenticated identity.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, claims: &VerifiedClaims, arguments: Value) -> Result<Value>;
}

/// Listing entry for a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

#[derive(Clone)]
struct Tool {
    info: ToolInfo,
    handler: Arc<dyn ToolHandler>,
}

/// Name-indexed registry of callable tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) {
        let name = name.into();
        self.tools.insert(
            name.clone(),
            Tool {
                info: ToolInfo {
                    name,
                    description: description.into(),
                },
                handler: Arc::new(handler),
            },
        );
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self.tools.values().map(|t| t.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn call(
        &self,
        name: &str,
        claims: &VerifiedClaims,
        arguments: Value,
    ) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        tool.handler.call(claims, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn call(&self, _claims: &VerifiedClaims, arguments: Value) -> Result<Value> {
            Ok(arguments)
        }
    }

    fn claims() -> VerifiedClaims {
        serde_json::from_value(json!({"iss": "https://auth.example.com", "sub": "user-1"}))
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_call() {
        let mut registry = ToolRegistry::new();
        registry.register("echo", "Echo the arguments back", EchoTool);

        let result = registry
            .call("echo", &claims(), json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result, json!({"x": 1}));

        let listing = registry.list();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "echo");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.call("nope", &claims(), Value::Null).await;
        assert!(matches!(result, Err(Error::ToolNotFound(_))));
    }
}
