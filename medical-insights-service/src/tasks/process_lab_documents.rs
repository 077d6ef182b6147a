use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::{debug, info, warn};

use super::{complete_stage, record_confidence, stages, state_keys};
use crate::analyzers::LabAnalyzer;
use crate::models::LabProcessingResult;

/// Analyzes every lab file with extracted text. A file that fails is recorded
/// and left out; the stage itself only fails on engine errors.
pub struct ProcessLabDocumentsTask {
    analyzer: LabAnalyzer,
}

impl ProcessLabDocumentsTask {
    pub fn new(analyzer: LabAnalyzer) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Task for ProcessLabDocumentsTask {
    fn id(&self) -> &str {
        stages::PROCESS_LAB_DOCUMENTS
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case_input = context.require(&state_keys::CASE_INPUT).await?;
        info!(case_id = %case_input.case_id, files = case_input.lab_files.len(), "processing lab documents");

        let mut result = LabProcessingResult::default();
        for file in &case_input.lab_files {
            match self.analyzer.analyze(file).await {
                Ok(Some(document)) => {
                    if let Some(score) = document.confidence_score {
                        let name = format!("lab_document:{}", document.file_id);
                        record_confidence(&context, &name, score).await?;
                    }
                    result.documents.push(document);
                }
                Ok(None) => {
                    debug!(file_name = %file.file_name, "lab file has no extracted text, skipping");
                }
                Err(e) => {
                    warn!(case_id = %case_input.case_id, file_name = %file.file_name, error = %e, "lab analysis failed");
                    context
                        .append(
                            &state_keys::PROCESSING_ERRORS,
                            format!("{}: {}: {}", self.id(), file.file_name, e),
                        )
                        .await?;
                }
            }
        }

        let processed = result.documents.len();
        context.put(&state_keys::LAB_RESULT, &result).await?;
        complete_stage(&context, self.id()).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(format!("{} lab document(s) analyzed", processed)),
        ))
    }
}
