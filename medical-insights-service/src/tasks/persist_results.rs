use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::{complete_stage, stage_failed, stages, state_keys};
use crate::store::CaseStore;

/// Hands the compiled insights to the case store, exactly once per run.
pub struct PersistResultsTask {
    store: Arc<dyn CaseStore>,
}

impl PersistResultsTask {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task for PersistResultsTask {
    fn id(&self) -> &str {
        stages::PERSIST_RESULTS
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case_input = context.require(&state_keys::CASE_INPUT).await?;
        let insights = context.require(&state_keys::MEDICAL_INSIGHTS).await?;

        self.store
            .upload_ai_insights(&case_input.case_id, &insights)
            .await
            .map_err(stage_failed)?;

        info!(case_id = %case_input.case_id, "insights persisted");
        complete_stage(&context, self.id()).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::End,
            Some("Insights persisted".to_string()),
        ))
    }
}
