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
use crate::models::Diagnosis;
use crate::prompts::DIAGNOSIS_PROMPT;

pub struct GenerateDiagnosisTask {
    gateway: Arc<GenerationGateway>,
}

impl GenerateDiagnosisTask {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Task for GenerateDiagnosisTask {
    fn id(&self) -> &str {
        stages::GENERATE_DIAGNOSIS
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let soap_note = context.require(&state_keys::SOAP_NOTE).await?;
        info!("generating primary diagnosis");

        let payload = serde_json::to_string(&soap_note).map_err(stage_failed)?;
        let response = self
            .gateway
            .invoke(DIAGNOSIS_PROMPT, &[], &format!("SOAP Note: {}", payload))
            .await
            .map_err(stage_failed)?;
        let response = require_object(response)?;

        let primary_diagnosis = text_field(&response, "diagnosis")
            .ok_or_else(|| stage_failed("response names no diagnosis"))?;

        let diagnosis = Diagnosis {
            primary_diagnosis,
            icd_code: text_field(&response, "icd_code"),
            description: text_field(&response, "description").unwrap_or_default(),
            confidence_score: normalize_score(response.get("confidence_score")),
            supporting_evidence: string_list(response.get("supporting_evidence")),
        };

        info!(diagnosis = %diagnosis.primary_diagnosis, "primary diagnosis generated");
        record_confidence(&context, "diagnosis", diagnosis.confidence_score).await?;
        context.put(&state_keys::DIAGNOSIS, &diagnosis).await?;
        complete_stage(&context, self.id()).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Primary diagnosis generated".to_string()),
        ))
    }
}
