//! Save Memory Tool
//!
//! Store a note, an insight linked to files, or a session summary.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{CommitSummaryInput, EngineContext, InsightInput, NoteInput};

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "type": {
                "type": "string",
                "enum": ["note", "insight", "commit_summary"],
                "default": "note"
            },
            "repository": { "type": "string" },
            "content": { "type": "string", "description": "Note text, insight text or session summary" },
            "title": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "initiative": { "type": "string", "description": "Initiative id or name (defaults to the focused one)" },
            "linkedFiles": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Repository-relative files an insight depends on (required for insights)"
            },
            "replacesId": { "type": "string", "description": "Insight superseded by this one" },
            "changedFiles": { "type": "array", "items": { "type": "string" } },
            "sessionId": { "type": "string", "description": "Stable id; resaving a session overwrites it" }
        },
        "required": ["repository", "content"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveArgs {
    #[serde(rename = "type", default = "default_type")]
    memory_type: String,
    repository: String,
    content: String,
    title: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    initiative: Option<String>,
    #[serde(default)]
    linked_files: Vec<String>,
    replaces_id: Option<String>,
    #[serde(default)]
    changed_files: Vec<String>,
    session_id: Option<String>,
}

fn default_type() -> String {
    "note".to_string()
}

pub async fn execute(ctx: &Arc<EngineContext>, args: Option<Value>) -> Result<Value, String> {
    let args: SaveArgs = parse_args(args)?;

    let outcome = match args.memory_type.as_str() {
        "note" | "decision" => ctx.writer.save_note(NoteInput {
            repository: args.repository,
            content: args.content,
            title: args.title,
            tags: args.tags,
            initiative: args.initiative,
        }),
        "insight" => ctx.writer.save_insight(InsightInput {
            repository: args.repository,
            content: args.content,
            linked_files: args.linked_files,
            title: args.title,
            tags: args.tags,
            initiative: args.initiative,
            replaces_id: args.replaces_id,
        }),
        "commit_summary" | "session_summary" => ctx.writer.save_commit_summary(CommitSummaryInput {
            repository: args.repository,
            summary: args.content,
            changed_files: args.changed_files,
            session_id: args.session_id,
            initiative: args.initiative,
        }),
        other => return Err(format!("Unknown memory type: {}", other)),
    }
    .map_err(|e| e.to_string())?;

    serde_json::to_value(outcome).map_err(|e| e.to_string())
}
