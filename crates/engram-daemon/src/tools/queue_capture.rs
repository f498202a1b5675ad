//! Queue Capture Tool
//!
//! Defer a session transcript for background summarization.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;

use engram_core::{CaptureJob, EngineContext};

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "sessionId": { "type": "string" },
            "repository": { "type": "string" },
            "transcript": { "type": "string" },
            "filesEdited": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["sessionId", "repository", "transcript"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueArgs {
    session_id: String,
    repository: String,
    transcript: String,
    #[serde(default)]
    files_edited: Vec<String>,
}

pub async fn execute(
    ctx: &Arc<EngineContext>,
    wake: &Arc<Notify>,
    args: Option<Value>,
) -> Result<Value, String> {
    let args: QueueArgs = parse_args(args)?;
    let job = CaptureJob::new(args.session_id.clone(), args.repository, args.transcript)
        .with_files(args.files_edited);
    let queued = ctx.queue.enqueue(job).map_err(|e| e.to_string())?;
    wake.notify_one();

    Ok(serde_json::json!({
        "sessionId": args.session_id,
        "queued": queued,
        "documentId": format!("commit_summary:{}", args.session_id),
    }))
}
