//! Tools
//!
//! Each tool exposes `schema()` describing its arguments and `execute()`
//! returning a JSON value or an error message naming what failed.

pub mod ingest;
pub mod initiative;
pub mod orient;
pub mod queue_capture;
pub mod save_memory;
pub mod search;
pub mod validate_insight;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode tool arguments, rejecting a missing object
pub(crate) fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T, String> {
    match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e)),
        None => Err("Missing arguments".to_string()),
    }
}
