use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::{
    complete_stage, record_confidence, require_object, stage_failed, stages, state_keys, text_field,
};
use crate::analyzers::string_list;
use crate::confidence::normalize_score;
use crate::gateway::GenerationGateway;
use crate::models::CaseSummary;
use crate::prompts::CASE_SUMMARY_PROMPT;

pub struct GenerateCaseSummaryTask {
    gateway: Arc<GenerationGateway>,
}

impl GenerateCaseSummaryTask {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Task for GenerateCaseSummaryTask {
    fn id(&self) -> &str {
        stages::GENERATE_CASE_SUMMARY
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case_input = context.require(&state_keys::CASE_INPUT).await?;
        let labs = context.require(&state_keys::LAB_RESULT).await?;
        let radiology = context.require(&state_keys::RADIOLOGY_RESULT).await?;
        info!(case_id = %case_input.case_id, "generating case summary");

        let lab_summary = labs.joined_summaries();
        let radiology_summary = radiology.joined_summaries();
        let patient_info = case_input.patient_data.descriptor();
        let doctor_notes = case_input
            .doctor_case_summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("None provided");

        let lab_summaries = if lab_summary.is_empty() {
            "No lab data available"
        } else {
            lab_summary.as_str()
        };
        let radiology_summaries = if radiology_summary.is_empty() {
            "No radiology data available"
        } else {
            radiology_summary.as_str()
        };

        let response = self
            .gateway
            .invoke(
                CASE_SUMMARY_PROMPT,
                &[
                    ("patient_info", patient_info.as_str()),
                    ("doctor_notes", doctor_notes),
                    ("lab_summaries", lab_summaries),
                    ("radiology_summaries", radiology_summaries),
                ],
                "Generate the case summary for the information above.",
            )
            .await
            .map_err(stage_failed)?;

        let response = require_object(response)?;
        let comprehensive_summary = text_field(&response, "summary")
            .or_else(|| text_field(&response, "comprehensive_summary"))
            .ok_or_else(|| stage_failed("response has no summary narrative"))?;

        let summary = CaseSummary {
            comprehensive_summary,
            key_findings: string_list(response.get("key_findings")),
            patient_context: case_input.patient_data.clone(),
            doctor_notes: case_input.doctor_case_summary.clone(),
            lab_summary,
            radiology_summary,
            confidence_score: normalize_score(response.get("confidence_score")),
        };

        record_confidence(&context, "case_summary", summary.confidence_score).await?;
        context.put(&state_keys::CASE_SUMMARY, &summary).await?;
        complete_stage(&context, self.id()).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Case summary generated".to_string()),
        ))
    }
}
