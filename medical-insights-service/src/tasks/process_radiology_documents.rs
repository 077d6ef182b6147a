use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::{debug, info};

use super::{complete_stage, stages, state_keys};
use crate::analyzers::RadiologyAnalyzer;
use crate::models::RadiologyProcessingResult;

/// Builds radiology documents from the summaries the vision sub-pipeline left
/// on each file. No generation call happens here.
pub struct ProcessRadiologyDocumentsTask;

#[async_trait]
impl Task for ProcessRadiologyDocumentsTask {
    fn id(&self) -> &str {
        stages::PROCESS_RADIOLOGY_DOCUMENTS
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case_input = context.require(&state_keys::CASE_INPUT).await?;
        info!(case_id = %case_input.case_id, files = case_input.radiology_files.len(), "processing radiology documents");

        let mut result = RadiologyProcessingResult::default();
        for file in &case_input.radiology_files {
            match RadiologyAnalyzer::analyze(file) {
                Some(document) => result.documents.push(document),
                None => debug!(file_name = %file.file_name, "radiology file has no prior summary, skipping"),
            }
        }

        let processed = result.documents.len();
        context.put(&state_keys::RADIOLOGY_RESULT, &result).await?;
        complete_stage(&context, self.id()).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(format!("{} radiology document(s) summarized", processed)),
        ))
    }
}
