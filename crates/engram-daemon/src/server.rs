//! Tool dispatcher
//!
//! Decodes one request line, routes it to a tool and encodes the response.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use engram_core::EngineContext;

use crate::protocol::{ToolRequest, ToolResponse, LIST_TOOLS};
use crate::tools;

pub struct Server {
    ctx: Arc<EngineContext>,
    capture_wake: Arc<Notify>,
}

impl Server {
    pub fn new(ctx: Arc<EngineContext>, capture_wake: Arc<Notify>) -> Self {
        Self { ctx, capture_wake }
    }

    /// Handle one raw request line
    pub async fn handle_line(&self, line: &str) -> ToolResponse {
        let request: ToolRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                return ToolResponse::error(None, format!("Parse error: {}", e));
            }
        };
        self.handle(request).await
    }

    pub async fn handle(&self, request: ToolRequest) -> ToolResponse {
        debug!(tool = %request.tool, "Tool call");
        let result = self.dispatch(&request.tool, request.arguments).await;
        match result {
            Ok(value) => ToolResponse::success(request.id, value),
            Err(e) => {
                warn!(tool = %request.tool, "Tool failed: {}", e);
                ToolResponse::error(request.id, e)
            }
        }
    }

    async fn dispatch(&self, tool: &str, args: Option<Value>) -> Result<Value, String> {
        match tool {
            "search" => tools::search::execute(&self.ctx, args).await,
            "ingest" => tools::ingest::execute(&self.ctx, args).await,
            "save_memory" => tools::save_memory::execute(&self.ctx, args).await,
            "validate_insight" => tools::validate_insight::execute(&self.ctx, args).await,
            "initiative" => tools::initiative::execute(&self.ctx, args).await,
            "orient" => tools::orient::execute(&self.ctx, args).await,
            "queue_capture" => {
                tools::queue_capture::execute(&self.ctx, &self.capture_wake, args).await
            }
            LIST_TOOLS => Ok(tool_list()),
            name => Err(format!("Unknown tool: {}", name)),
        }
    }
}

fn tool_list() -> Value {
    let tools = [
        ("search", "Hybrid semantic + lexical retrieval with staleness annotations", tools::search::schema()),
        ("ingest", "Delta-sync a repository into the index", tools::ingest::schema()),
        ("save_memory", "Save a note, insight or session summary", tools::save_memory::schema()),
        ("validate_insight", "Check or record whether an insight still holds", tools::validate_insight::schema()),
        ("initiative", "Create, focus, update and complete initiatives", tools::initiative::schema()),
        ("orient", "Focused initiative, active work and recent context", tools::orient::schema()),
        ("queue_capture", "Queue a session transcript for background summarization", tools::queue_capture::schema()),
    ];
    Value::Array(
        tools
            .into_iter()
            .map(|(name, description, schema)| {
                serde_json::json!({ "name": name, "description": description, "inputSchema": schema })
            })
            .collect(),
    )
}
