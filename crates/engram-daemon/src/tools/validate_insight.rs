//! Validate Insight Tool
//!
//! Without an outcome, reports current staleness. With one, records it.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{EngineContext, ValidationOutcome, ValidationRequest};

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "insightId": { "type": "string" },
            "outcome": {
                "type": "string",
                "enum": ["still_valid", "partially_valid", "no_longer_valid"],
                "description": "Omit to only check staleness"
            },
            "notes": { "type": "string" },
            "deprecate": {
                "type": "boolean",
                "description": "Retire the insight (no_longer_valid only)",
                "default": false
            },
            "replacement": {
                "type": "string",
                "description": "Content of a new insight superseding this one (requires deprecate)"
            }
        },
        "required": ["insightId"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateArgs {
    insight_id: String,
    outcome: Option<String>,
    notes: Option<String>,
    #[serde(default)]
    deprecate: bool,
    replacement: Option<String>,
}

pub async fn execute(ctx: &Arc<EngineContext>, args: Option<Value>) -> Result<Value, String> {
    let args: ValidateArgs = parse_args(args)?;

    let Some(outcome) = args.outcome else {
        let report = ctx
            .validator
            .staleness(&args.insight_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("No insight or note with id {}", args.insight_id))?;
        return Ok(serde_json::json!({ "insightId": args.insight_id, "staleness": report }));
    };

    let outcome: ValidationOutcome = outcome.parse()?;
    let mut request = ValidationRequest::new(args.insight_id, outcome);
    request.notes = args.notes;
    request.deprecate = args.deprecate;
    request.replacement = args.replacement;

    let result = ctx.validator.validate(request).map_err(|e| e.to_string())?;
    serde_json::to_value(result).map_err(|e| e.to_string())
}
