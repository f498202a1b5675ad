//! Search Tool
//!
//! Hybrid retrieval over one repository's memory and code.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{DocumentType, EngineContext, SearchRequest};

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Natural language or identifier query" },
            "repository": { "type": "string", "description": "Repository name" },
            "branch": { "type": "string", "description": "Branch override for code visibility" },
            "initiative": { "type": "string", "description": "Initiative id or name to boost" },
            "initiativeExclusive": {
                "type": "boolean",
                "description": "Only return documents of the initiative",
                "default": false
            },
            "types": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["code", "note", "insight", "commit_summary", "initiative", "skeleton", "tech_stack"]
                }
            },
            "minScore": { "type": "number", "description": "Drop results scoring below this" },
            "limit": { "type": "integer", "minimum": 1, "description": "Results after reranking" },
            "candidates": { "type": "integer", "minimum": 1, "description": "Candidates per retrieval leg" }
        },
        "required": ["query", "repository"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArgs {
    query: String,
    repository: String,
    branch: Option<String>,
    initiative: Option<String>,
    #[serde(default)]
    initiative_exclusive: bool,
    types: Option<Vec<String>>,
    min_score: Option<f32>,
    limit: Option<usize>,
    candidates: Option<usize>,
}

pub async fn execute(ctx: &Arc<EngineContext>, args: Option<Value>) -> Result<Value, String> {
    let args: SearchArgs = parse_args(args)?;

    let mut request = SearchRequest::new(args.query, args.repository);
    request.branch = args.branch;
    if let Some(initiative) = args.initiative {
        request = request.initiative(initiative, args.initiative_exclusive);
    }
    if let Some(types) = args.types {
        let types = types
            .iter()
            .map(|t| t.parse::<DocumentType>())
            .collect::<Result<Vec<_>, _>>()?;
        request = request.types(types);
    }
    request.min_score = args.min_score;
    request.top_k_rerank = args.limit;
    request.top_k_retrieve = args.candidates;

    let response = ctx.search.search(request).await.map_err(|e| e.to_string())?;
    serde_json::to_value(response).map_err(|e| e.to_string())
}
