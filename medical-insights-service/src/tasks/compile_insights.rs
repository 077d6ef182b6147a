use async_trait::async_trait;
use chrono::Utc;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::{complete_stage, record_confidence, stages, state_keys};
use crate::confidence::overall_confidence;
use crate::models::MedicalInsights;

/// Assembles the terminal artifact. The overall score comes from the three
/// stage-level scores only, never from per-file ones.
pub struct CompileInsightsTask;

#[async_trait]
impl Task for CompileInsightsTask {
    fn id(&self) -> &str {
        stages::COMPILE_INSIGHTS
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case_summary = context.require(&state_keys::CASE_SUMMARY).await?;
        let soap_note = context.require(&state_keys::SOAP_NOTE).await?;
        let primary_diagnosis = context.require(&state_keys::DIAGNOSIS).await?;

        let overall_confidence_score = overall_confidence(
            case_summary.confidence_score,
            soap_note.confidence_score,
            primary_diagnosis.confidence_score,
        );

        let insights = MedicalInsights {
            case_summary,
            soap_note,
            primary_diagnosis,
            overall_confidence_score,
            generated_at: Utc::now(),
        };

        info!(overall_confidence = overall_confidence_score, "medical insights compiled");
        record_confidence(&context, "overall", overall_confidence_score).await?;
        context.put(&state_keys::MEDICAL_INSIGHTS, &insights).await?;
        complete_stage(&context, self.id()).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(format!("Insights compiled (confidence {:.2})", overall_confidence_score)),
        ))
    }
}
