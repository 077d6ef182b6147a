pub mod case_summary;
pub mod compile_insights;
pub mod diagnosis;
pub mod entities;
pub mod persist_results;
pub mod process_lab_documents;
pub mod process_radiology_documents;
pub mod soap_note;

// Shared modules
pub mod types;

pub use case_summary::GenerateCaseSummaryTask;
pub use compile_insights::CompileInsightsTask;
pub use diagnosis::GenerateDiagnosisTask;
pub use persist_results::PersistResultsTask;
pub use process_lab_documents::ProcessLabDocumentsTask;
pub use process_radiology_documents::ProcessRadiologyDocumentsTask;
pub use soap_note::GenerateSoapNoteTask;

pub use types::{stages, state_keys};

use graph_flow::{Context, GraphError, Result};
use serde_json::{Map, Value};
use std::fmt::Display;

/// Record `stage` as the last stage that ran to completion.
pub(crate) async fn complete_stage(context: &Context, stage: &str) -> Result<()> {
    context
        .put(&state_keys::PROCESSING_STAGE, &stage.to_string())
        .await
}

pub(crate) async fn record_confidence(context: &Context, name: &str, score: f64) -> Result<()> {
    context
        .update(&state_keys::CONFIDENCE_SCORES, |scores| {
            scores.insert(name.to_string(), score);
        })
        .await
}

/// The failing stage is known from the session, so only the reason is carried.
pub(crate) fn stage_failed(reason: impl Display) -> GraphError {
    GraphError::TaskExecutionFailed(reason.to_string())
}

/// Aggregate stages cannot proceed without a JSON object to build their artifact from.
pub(crate) fn require_object(response: Option<Value>) -> Result<Map<String, Value>> {
    match response {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(stage_failed(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        None => Err(stage_failed("no JSON found in the generation response")),
    }
}

pub(crate) fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
