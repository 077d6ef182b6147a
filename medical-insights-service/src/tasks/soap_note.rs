use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::{
    complete_stage, record_confidence, require_object, stage_failed, stages, state_keys, text_field,
};
use crate::confidence::normalize_score;
use crate::gateway::GenerationGateway;
use crate::models::SoapNote;
use crate::prompts::SOAP_NOTE_PROMPT;

pub struct GenerateSoapNoteTask {
    gateway: Arc<GenerationGateway>,
}

impl GenerateSoapNoteTask {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Task for GenerateSoapNoteTask {
    fn id(&self) -> &str {
        stages::GENERATE_SOAP_NOTE
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case_summary = context.require(&state_keys::CASE_SUMMARY).await?;
        info!("generating SOAP note");

        let payload = serde_json::to_string(&case_summary).map_err(stage_failed)?;
        let response = self
            .gateway
            .invoke(SOAP_NOTE_PROMPT, &[], &format!("Case Summary: {}", payload))
            .await
            .map_err(stage_failed)?;
        let response = require_object(response)?;

        let section = |key: &str| text_field(&response, key).unwrap_or_default();
        let soap_note = SoapNote {
            subjective: section("subjective"),
            objective: section("objective"),
            assessment: section("assessment"),
            plan: section("plan"),
            confidence_score: normalize_score(response.get("confidence_score")),
        };

        record_confidence(&context, "soap_note", soap_note.confidence_score).await?;
        context.put(&state_keys::SOAP_NOTE, &soap_note).await?;
        complete_stage(&context, self.id()).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("SOAP note generated".to_string()),
        ))
    }
}
