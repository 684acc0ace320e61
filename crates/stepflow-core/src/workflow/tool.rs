//! Tool registry seam.
//!
//! Tool steps call out to an externally owned registry that performs the
//! actual side effects (HTTP, shell, file I/O). The engine only sees this
//! trait, injected as `Arc<dyn ToolRegistry>`, so tests can substitute a
//! scripted fake.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome reported by a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Boxed future returned by [`ToolRegistry::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolResult> + Send + 'a>>;

/// Executes named tools on behalf of tool steps.
///
/// The engine imposes no timeout on `execute`; any timeout belongs to the
/// registry implementation.
pub trait ToolRegistry: Send + Sync {
    fn execute<'a>(&'a self, tool_name: &'a str, params: HashMap<String, Value>) -> ToolFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl ToolRegistry for Echo {
        fn execute<'a>(
            &'a self,
            tool_name: &'a str,
            params: HashMap<String, Value>,
        ) -> ToolFuture<'a> {
            Box::pin(async move {
                match tool_name {
                    "echo" => ToolResult::ok(json!(params)),
                    other => ToolResult::err(format!("unknown tool: {other}")),
                }
            })
        }
    }

    #[tokio::test]
    async fn test_registry_is_object_safe() {
        let registry: std::sync::Arc<dyn ToolRegistry> = std::sync::Arc::new(Echo);

        let params = HashMap::from([("msg".to_string(), json!("hi"))]);
        let ok = registry.execute("echo", params).await;
        assert!(ok.success);
        assert_eq!(ok.data, Some(json!({ "msg": "hi" })));

        let err = registry.execute("rm", HashMap::new()).await;
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("unknown tool: rm"));
    }

    #[test]
    fn test_tool_result_deserializes_without_optional_fields() {
        let result: ToolResult = serde_json::from_value(json!({ "success": true })).unwrap();
        assert!(result.success);
        assert!(result.data.is_none());
        assert!(result.error.is_none());
    }
}
