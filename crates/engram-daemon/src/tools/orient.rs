//! Orient Tool
//!
//! Session-start overview: focused work, active initiatives, recent context,
//! pending captures and the schema version.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::EngineContext;

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "repository": { "type": "string" }
        },
        "required": ["repository"]
    })
}

#[derive(Debug, Deserialize)]
struct OrientArgs {
    repository: String,
}

pub async fn execute(ctx: &Arc<EngineContext>, args: Option<Value>) -> Result<Value, String> {
    let args: OrientArgs = parse_args(args)?;
    let orientation = ctx
        .initiatives
        .orientation(&args.repository)
        .map_err(|e| e.to_string())?;
    let queued = ctx.queue.len().map_err(|e| e.to_string())?;
    let schema = ctx.migration_status().map_err(|e| e.to_string())?;

    let mut value = serde_json::to_value(orientation).map_err(|e| e.to_string())?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("queuedCaptures".to_string(), Value::from(queued));
        obj.insert(
            "schema".to_string(),
            serde_json::json!({
                "version": schema.current_version,
                "target": schema.target_version,
            }),
        );
    }
    Ok(value)
}
