//! Persistence collaborator: cases, their files, and the generated insights.

mod memory;
mod postgres;

pub use memory::InMemoryCaseStore;
pub use postgres::PostgresCaseStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CaseStatus, FileCategory, MedicalInsights, PatientData};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("case {0} not found")]
    CaseNotFound(String),

    #[error("file {0} not found")]
    FileNotFound(String),

    #[error("case {case_id} cannot move from {from} to {to}")]
    InvalidTransition {
        case_id: String,
        from: CaseStatus,
        to: CaseStatus,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCase {
    pub case_id: String,
    pub user_id: String,
    pub patient: PatientData,
    pub case_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub user_id: String,
    pub patient: PatientData,
    pub case_summary: Option<String>,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFileRecord {
    pub file_id: String,
    pub case_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_url: Option<String>,
    pub file_category: FileCategory,
    pub text_data: Option<String>,
    pub ai_summary: Option<String>,
}

/// Fields the pipeline writes back onto a file record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub text_data: Option<String>,
    pub ai_summary: Option<String>,
}

/// `MedicalInsights` flattened into one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInsightsRow {
    pub case_id: String,

    pub comprehensive_summary: String,
    pub key_findings: Vec<String>,
    pub patient_context: PatientData,
    pub doctor_notes: Option<String>,
    pub lab_summary: String,
    pub radiology_summary: String,
    pub case_summary_confidence_score: f64,

    pub soap_subjective: String,
    pub soap_objective: String,
    pub soap_assessment: String,
    pub soap_plan: String,
    pub soap_confidence_score: f64,

    pub primary_diagnosis: String,
    pub icd_code: Option<String>,
    pub diagnosis_description: String,
    pub diagnosis_confidence_score: f64,
    pub supporting_evidence: Vec<String>,

    pub overall_confidence_score: f64,
    pub generated_at: DateTime<Utc>,
}

impl AiInsightsRow {
    pub fn from_insights(case_id: &str, insights: &MedicalInsights) -> Self {
        let summary = &insights.case_summary;
        let soap = &insights.soap_note;
        let diagnosis = &insights.primary_diagnosis;

        Self {
            case_id: case_id.to_string(),
            comprehensive_summary: summary.comprehensive_summary.clone(),
            key_findings: summary.key_findings.clone(),
            patient_context: summary.patient_context.clone(),
            doctor_notes: summary.doctor_notes.clone(),
            lab_summary: summary.lab_summary.clone(),
            radiology_summary: summary.radiology_summary.clone(),
            case_summary_confidence_score: summary.confidence_score,
            soap_subjective: soap.subjective.clone(),
            soap_objective: soap.objective.clone(),
            soap_assessment: soap.assessment.clone(),
            soap_plan: soap.plan.clone(),
            soap_confidence_score: soap.confidence_score,
            primary_diagnosis: diagnosis.primary_diagnosis.clone(),
            icd_code: diagnosis.icd_code.clone(),
            diagnosis_description: diagnosis.description.clone(),
            diagnosis_confidence_score: diagnosis.confidence_score,
            supporting_evidence: diagnosis.supporting_evidence.clone(),
            overall_confidence_score: insights.overall_confidence_score,
            generated_at: insights.generated_at,
        }
    }
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Create a case in the `processing` status.
    async fn create_case(&self, case: NewCase) -> Result<CaseRecord, StoreError>;

    async fn add_case_file(&self, file: CaseFileRecord) -> Result<(), StoreError>;

    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>, StoreError>;

    async fn get_case_files(&self, case_id: &str) -> Result<Vec<CaseFileRecord>, StoreError>;

    async fn update_case_file_metadata(
        &self,
        file_id: &str,
        metadata: FileMetadata,
    ) -> Result<(), StoreError>;

    /// Move a case to `status`. Terminal statuses are final.
    async fn update_case_status(&self, case_id: &str, status: CaseStatus) -> Result<(), StoreError>;

    async fn upload_ai_insights(
        &self,
        case_id: &str,
        insights: &MedicalInsights,
    ) -> Result<AiInsightsRow, StoreError>;

    async fn get_ai_insights(&self, case_id: &str) -> Result<Option<AiInsightsRow>, StoreError>;
}
