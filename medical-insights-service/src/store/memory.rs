use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::{
    AiInsightsRow, CaseFileRecord, CaseRecord, CaseStore, FileMetadata, NewCase, StoreError,
};
use crate::models::{CaseStatus, MedicalInsights};

/// Process-local store, used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct InMemoryCaseStore {
    cases: Arc<DashMap<String, CaseRecord>>,
    files: Arc<DashMap<String, CaseFileRecord>>,
    insights: Arc<DashMap<String, AiInsightsRow>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn create_case(&self, case: NewCase) -> Result<CaseRecord, StoreError> {
        let now = Utc::now();
        let record = CaseRecord {
            case_id: case.case_id.clone(),
            user_id: case.user_id,
            patient: case.patient,
            case_summary: case.case_summary,
            status: CaseStatus::Processing,
            created_at: now,
            updated_at: now,
        };
        self.cases.insert(case.case_id, record.clone());
        Ok(record)
    }

    async fn add_case_file(&self, file: CaseFileRecord) -> Result<(), StoreError> {
        if !self.cases.contains_key(&file.case_id) {
            return Err(StoreError::CaseNotFound(file.case_id));
        }
        self.files.insert(file.file_id.clone(), file);
        Ok(())
    }

    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>, StoreError> {
        Ok(self.cases.get(case_id).map(|entry| entry.clone()))
    }

    async fn get_case_files(&self, case_id: &str) -> Result<Vec<CaseFileRecord>, StoreError> {
        let mut files: Vec<CaseFileRecord> = self
            .files
            .iter()
            .filter(|entry| entry.case_id == case_id)
            .map(|entry| entry.value().clone())
            .collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }

    async fn update_case_file_metadata(
        &self,
        file_id: &str,
        metadata: FileMetadata,
    ) -> Result<(), StoreError> {
        let mut file = self
            .files
            .get_mut(file_id)
            .ok_or_else(|| StoreError::FileNotFound(file_id.to_string()))?;

        if let Some(text) = metadata.text_data {
            file.text_data = Some(text);
        }
        if let Some(summary) = metadata.ai_summary {
            file.ai_summary = Some(summary);
        }
        Ok(())
    }

    async fn update_case_status(&self, case_id: &str, status: CaseStatus) -> Result<(), StoreError> {
        let mut case = self
            .cases
            .get_mut(case_id)
            .ok_or_else(|| StoreError::CaseNotFound(case_id.to_string()))?;

        if !case.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                case_id: case_id.to_string(),
                from: case.status,
                to: status,
            });
        }

        case.status = status;
        case.updated_at = Utc::now();
        info!(case_id = %case_id, status = %status, "case status updated");
        Ok(())
    }

    async fn upload_ai_insights(
        &self,
        case_id: &str,
        insights: &MedicalInsights,
    ) -> Result<AiInsightsRow, StoreError> {
        if !self.cases.contains_key(case_id) {
            return Err(StoreError::CaseNotFound(case_id.to_string()));
        }
        let row = AiInsightsRow::from_insights(case_id, insights);
        self.insights.insert(case_id.to_string(), row.clone());
        Ok(row)
    }

    async fn get_ai_insights(&self, case_id: &str) -> Result<Option<AiInsightsRow>, StoreError> {
        Ok(self.insights.get(case_id).map(|entry| entry.clone()))
    }
}
