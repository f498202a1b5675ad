//! Line protocol
//!
//! One JSON request per stdin line, one JSON response per stdout line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pseudo-tool returning every tool name with its argument schema
pub const LIST_TOOLS: &str = "list_tools";

#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub tool: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }
}
