//! Case intake: turn freshly uploaded files into a `CaseInput` and hand it to
//! the medical insights agent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{CaseInput, CaseStatus, FileCategory, PatientData, ProcessedFile};
use crate::store::{CaseFileRecord, CaseStore, FileMetadata, StoreError};
use crate::text_extraction::{ExtractionStatus, TextExtractor};
use crate::vision::{VisionSubPipeline, image_data_url};
use crate::workflow::{MedicalInsightsAgent, PipelineError, PipelineOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub file_name: String,
    pub file_content: Vec<u8>,
    pub file_type: String,
}

/// Everything the case-creation boundary hands over once the case and its file
/// records are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub case_id: String,
    pub user_id: String,
    pub patient_name: String,
    pub patient_age: u32,
    pub patient_gender: String,
    pub case_summary: Option<String>,
    #[serde(default)]
    pub lab_files: Vec<UploadedFile>,
    #[serde(default)]
    pub radiology_files: Vec<UploadedFile>,
}

pub struct CasePipeline {
    store: Arc<dyn CaseStore>,
    extractor: Arc<dyn TextExtractor>,
    vision: VisionSubPipeline,
    agent: Arc<MedicalInsightsAgent>,
}

impl CasePipeline {
    pub fn new(
        store: Arc<dyn CaseStore>,
        extractor: Arc<dyn TextExtractor>,
        vision: VisionSubPipeline,
        agent: Arc<MedicalInsightsAgent>,
    ) -> Self {
        Self {
            store,
            extractor,
            vision,
            agent,
        }
    }

    pub fn agent(&self) -> &Arc<MedicalInsightsAgent> {
        &self.agent
    }

    /// Run a case end to end. File-level problems are carried into the run's
    /// error list; an `Err` means the case never reached the agent.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutcome, PipelineError> {
        let case_id = request.case_id.clone();
        match self.intake(&request).await {
            Ok((input, intake_errors)) => Ok(self.agent.execute(input, intake_errors).await),
            Err(e) => {
                warn!(case_id = %case_id, error = %e, "case intake failed");
                if let Err(status_error) = self
                    .store
                    .update_case_status(&case_id, CaseStatus::Failed)
                    .await
                {
                    warn!(case_id = %case_id, error = %status_error, "could not mark case as failed");
                }
                Err(PipelineError::Intake(e.to_string()))
            }
        }
    }

    async fn intake(
        &self,
        request: &PipelineRequest,
    ) -> Result<(CaseInput, Vec<String>), StoreError> {
        let mut errors = Vec::new();

        for file in &request.lab_files {
            if let Err(message) = self.extract_lab_text(file).await {
                warn!(case_id = %request.case_id, file_name = %file.file_name, error = %message, "lab text extraction failed");
                errors.push(format!("text_extraction: {}: {}", file.file_name, message));
            }
        }

        let inline_images: HashMap<String, String> = request
            .radiology_files
            .iter()
            .filter_map(|file| {
                image_data_url(&file.file_content, &file.file_type)
                    .map(|url| (file.file_id.clone(), url))
            })
            .collect();
        let vision_errors = self.vision.run(&request.case_id, &inline_images).await?;
        errors.extend(
            vision_errors
                .into_iter()
                .map(|e| format!("vision_analysis: {}", e)),
        );

        let files = self.store.get_case_files(&request.case_id).await?;
        let (lab_files, radiology_files): (Vec<_>, Vec<_>) = files
            .into_iter()
            .map(processed_file)
            .partition(|f| f.category == FileCategory::Lab);

        info!(
            case_id = %request.case_id,
            lab_files = lab_files.len(),
            radiology_files = radiology_files.len(),
            intake_errors = errors.len(),
            "case intake complete"
        );

        let input = CaseInput {
            case_id: request.case_id.clone(),
            user_id: request.user_id.clone(),
            patient_data: PatientData {
                name: request.patient_name.clone(),
                age: request.patient_age,
                gender: request.patient_gender.clone(),
            },
            doctor_case_summary: request.case_summary.clone(),
            lab_files,
            radiology_files,
        };
        Ok((input, errors))
    }

    /// Stage the upload in a temporary file for the extractor. The file is
    /// removed when this returns, on every path.
    async fn extract_lab_text(&self, file: &UploadedFile) -> Result<(), String> {
        let suffix = Path::new(&file.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let staged = tempfile::Builder::new()
            .prefix("case-file-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| format!("could not stage file: {}", e))?;

        let written = tokio::fs::write(staged.path(), &file.file_content).await;
        let outcome = match written {
            Ok(()) => Ok(self.extractor.extract_text(staged.path()).await),
            Err(e) => Err(format!("could not stage file: {}", e)),
        };
        close_staged(staged);
        let outcome = outcome?;

        match (outcome.status, outcome.text) {
            (ExtractionStatus::Success, Some(text)) => {
                let metadata = FileMetadata {
                    text_data: Some(text),
                    ai_summary: None,
                };
                self.store
                    .update_case_file_metadata(&file.file_id, metadata)
                    .await
                    .map_err(|e| e.to_string())
            }
            _ => Err(outcome
                .error
                .unwrap_or_else(|| "extraction returned no text".to_string())),
        }
    }
}

fn close_staged(staged: tempfile::NamedTempFile) {
    let path = staged.path().to_path_buf();
    if let Err(e) = staged.close() {
        warn!(path = %path.display(), error = %e, "could not remove staged file");
    }
}

fn processed_file(record: CaseFileRecord) -> ProcessedFile {
    ProcessedFile {
        file_id: record.file_id,
        file_name: record.file_name,
        file_type: record.file_type,
        category: record.file_category,
        text_data: record.text_data,
        ai_summary: record.ai_summary,
        file_url: record.file_url,
    }
}
