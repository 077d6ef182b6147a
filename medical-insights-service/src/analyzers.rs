//! Per-document-class analysis: lab documents through one gateway call each,
//! radiology documents from their already materialized vision summary.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::confidence::normalize_score;
use crate::gateway::{GatewayError, GenerationGateway};
use crate::models::{LabDocument, LabValue, ProcessedFile, RadiologyDocument};
use crate::prompts::LAB_ANALYSIS_PROMPT;

pub struct LabAnalyzer {
    gateway: Arc<GenerationGateway>,
}

impl LabAnalyzer {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }

    /// Analyze one lab file. Files without extracted text yield `Ok(None)`.
    ///
    /// A response without recoverable JSON still produces a document, just
    /// without values or summary.
    pub async fn analyze(&self, file: &ProcessedFile) -> Result<Option<LabDocument>, GatewayError> {
        let Some(text) = file.text_data.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };

        let response = self.gateway.invoke(LAB_ANALYSIS_PROMPT, &[], text).await?;
        let analysis = match response {
            Some(Value::Object(map)) => map,
            Some(_) | None => {
                warn!(file_name = %file.file_name, "lab analysis returned no structured data");
                serde_json::Map::new()
            }
        };

        let lab_values = analysis.get("lab_values").and_then(|raw| parse_lab_values(raw, file));
        let summary = analysis
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty());
        let key_abnormalities = string_list(analysis.get("key_abnormalities"));
        let confidence_score = analysis
            .contains_key("confidence_score")
            .then(|| normalize_score(analysis.get("confidence_score")));

        info!(
            file_name = %file.file_name,
            values = lab_values.as_ref().map_or(0, BTreeMap::len),
            has_summary = summary.is_some(),
            "lab document analyzed"
        );

        Ok(Some(LabDocument {
            file_id: file.file_id.clone(),
            file_name: file.file_name.clone(),
            extracted_text: text.to_string(),
            lab_values,
            summary,
            key_abnormalities,
            confidence_score,
        }))
    }
}

fn parse_lab_values(raw: &Value, file: &ProcessedFile) -> Option<BTreeMap<String, LabValue>> {
    if raw.is_null() {
        return None;
    }
    match serde_json::from_value(raw.clone()) {
        Ok(values) => Some(values),
        Err(e) => {
            warn!(file_name = %file.file_name, error = %e, "discarding malformed lab_values");
            None
        }
    }
}

/// Collect the string entries of a JSON array, ignoring anything else.
pub(crate) fn string_list(raw: Option<&Value>) -> Vec<String> {
    raw.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct RadiologyAnalyzer;

impl RadiologyAnalyzer {
    /// Build a document from the file's prior vision summary. Files without one yield `None`.
    pub fn analyze(file: &ProcessedFile) -> Option<RadiologyDocument> {
        let raw = file.ai_summary.as_deref().filter(|s| !s.trim().is_empty())?;

        Some(RadiologyDocument {
            file_id: file.file_id.clone(),
            file_name: file.file_name.clone(),
            summary: unwrap_summary_envelope(raw),
        })
    }
}

/// `{"summary": "..."}` yields its summary; anything else is used verbatim.
pub fn unwrap_summary_envelope(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => match map.get("summary") {
            Some(Value::String(summary)) => summary.clone(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}
