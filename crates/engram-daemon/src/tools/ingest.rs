//! Ingest Tool
//!
//! Delta-sync one repository into the index.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{EngineContext, IngestRequest};

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": "Repository root on disk" },
            "repository": { "type": "string", "description": "Repository name (defaults to the directory name)" },
            "include": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Only index changed files matching these globs"
            },
            "useIgnoreFiles": {
                "type": "boolean",
                "description": "Apply the global and per-repository ignore files",
                "default": true
            },
            "forceFull": {
                "type": "boolean",
                "description": "Ignore prior sync state and reindex everything",
                "default": false
            }
        },
        "required": ["path"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestArgs {
    path: String,
    repository: Option<String>,
    #[serde(default)]
    include: Vec<String>,
    use_ignore_files: Option<bool>,
    #[serde(default)]
    force_full: bool,
}

pub async fn execute(ctx: &Arc<EngineContext>, args: Option<Value>) -> Result<Value, String> {
    let args: IngestArgs = parse_args(args)?;
    if args.path.trim().is_empty() {
        return Err("path cannot be empty".to_string());
    }

    let mut request = IngestRequest::new(args.path)
        .include(args.include)
        .force_full(args.force_full);
    request.repository = args.repository;
    if let Some(use_ignore_files) = args.use_ignore_files {
        request.use_ignore_files = use_ignore_files;
    }

    let report = ctx.ingest(request).await.map_err(|e| e.to_string())?;
    serde_json::to_value(report).map_err(|e| e.to_string())
}
