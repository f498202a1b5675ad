//! Initiative Tool
//!
//! Create, focus, update and complete tracked units of multi-session work.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{EngineContext, InitiativeStatus};

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["create", "list", "focus", "complete", "update_status"]
            },
            "repository": { "type": "string" },
            "name": { "type": "string", "description": "New initiative name (create)" },
            "goal": { "type": "string", "description": "What done looks like (create)" },
            "initiative": { "type": "string", "description": "Initiative id or name (focus, complete)" },
            "summary": { "type": "string", "description": "Completion summary (complete)" },
            "status": { "type": "string", "description": "Free-text progress (update_status); status filter (list)" }
        },
        "required": ["action", "repository"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiativeArgs {
    action: String,
    repository: String,
    name: Option<String>,
    goal: Option<String>,
    initiative: Option<String>,
    summary: Option<String>,
    status: Option<String>,
}

fn required<'a>(value: &'a Option<String>, field: &str, action: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| format!("'{}' is required for {}", field, action))
}

pub async fn execute(ctx: &Arc<EngineContext>, args: Option<Value>) -> Result<Value, String> {
    let args: InitiativeArgs = parse_args(args)?;
    let manager = &ctx.initiatives;
    let repo = args.repository.as_str();

    let value = match args.action.as_str() {
        "create" => {
            let name = required(&args.name, "name", "create")?;
            let created = manager
                .create(repo, name, args.goal.clone())
                .map_err(|e| e.to_string())?;
            serde_json::to_value(created)
        }
        "list" => {
            let status = args
                .status
                .as_deref()
                .map(str::parse::<InitiativeStatus>)
                .transpose()?;
            let initiatives = manager.list(repo, status).map_err(|e| e.to_string())?;
            Ok(serde_json::json!({ "total": initiatives.len(), "initiatives": initiatives }))
        }
        "focus" => {
            let target = required(&args.initiative, "initiative", "focus")?;
            serde_json::to_value(manager.focus(repo, target).map_err(|e| e.to_string())?)
        }
        "complete" => {
            let target = required(&args.initiative, "initiative", "complete")?;
            let summary = required(&args.summary, "summary", "complete")?;
            serde_json::to_value(
                manager
                    .complete(repo, target, summary)
                    .map_err(|e| e.to_string())?,
            )
        }
        "update_status" => {
            let text = required(&args.status, "status", "update_status")?;
            serde_json::to_value(manager.update_status(repo, text).map_err(|e| e.to_string())?)
        }
        other => {
            return Err(format!(
                "Unknown action '{}' (expected create, list, focus, complete, update_status)",
                other
            ));
        }
    };
    value.map_err(|e| e.to_string())
}
