use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Lab,
    Radiology,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Lab => "lab",
            FileCategory::Radiology => "radiology",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lab" => Ok(FileCategory::Lab),
            "radiology" => Ok(FileCategory::Radiology),
            other => Err(format!("unknown file category: {}", other)),
        }
    }
}

/// Lifecycle of a case. `Processing` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Processing,
    Completed,
    Failed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Processing => "processing",
            CaseStatus::Completed => "completed",
            CaseStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CaseStatus::Processing)
    }

    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        matches!(
            (self, next),
            (CaseStatus::Processing, CaseStatus::Completed)
                | (CaseStatus::Processing, CaseStatus::Failed)
        )
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(CaseStatus::Processing),
            "completed" => Ok(CaseStatus::Completed),
            "failed" => Ok(CaseStatus::Failed),
            other => Err(format!("unknown case status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientData {
    pub name: String,
    pub age: u32,
    pub gender: String,
}

impl PatientData {
    /// One-line descriptor used when prompting.
    pub fn descriptor(&self) -> String {
        format!(
            "Name: {}, Age: {}, Gender: {}",
            self.name, self.age, self.gender
        )
    }
}

/// A case file as handed to the pipeline by the file-processing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    pub category: FileCategory,
    pub text_data: Option<String>,
    /// Prior AI-derived summary, either a serialized JSON envelope or plain text.
    pub ai_summary: Option<String>,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseInput {
    pub case_id: String,
    pub user_id: String,
    pub patient_data: PatientData,
    pub doctor_case_summary: Option<String>,
    pub lab_files: Vec<ProcessedFile>,
    pub radiology_files: Vec<ProcessedFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabValue {
    #[serde(default)]
    pub value: serde_json::Value,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabDocument {
    pub file_id: String,
    pub file_name: String,
    pub extracted_text: String,
    pub lab_values: Option<BTreeMap<String, LabValue>>,
    pub summary: Option<String>,
    #[serde(default)]
    pub key_abnormalities: Vec<String>,
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiologyDocument {
    pub file_id: String,
    pub file_name: String,
    pub summary: String,
}

/// Output of the `process_lab_documents` stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabProcessingResult {
    pub documents: Vec<LabDocument>,
}

impl LabProcessingResult {
    pub fn joined_summaries(&self) -> String {
        join_summaries(self.documents.iter().filter_map(|d| d.summary.as_deref()))
    }
}

/// Output of the `process_radiology_documents` stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadiologyProcessingResult {
    pub documents: Vec<RadiologyDocument>,
}

impl RadiologyProcessingResult {
    pub fn joined_summaries(&self) -> String {
        join_summaries(self.documents.iter().map(|d| d.summary.as_str()))
    }
}

fn join_summaries<'a>(summaries: impl Iterator<Item = &'a str>) -> String {
    summaries
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub comprehensive_summary: String,
    pub key_findings: Vec<String>,
    pub patient_context: PatientData,
    pub doctor_notes: Option<String>,
    pub lab_summary: String,
    pub radiology_summary: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoapNote {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub primary_diagnosis: String,
    pub icd_code: Option<String>,
    pub description: String,
    pub confidence_score: f64,
    pub supporting_evidence: Vec<String>,
}

/// Terminal artifact of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalInsights {
    pub case_summary: CaseSummary,
    pub soap_note: SoapNote,
    pub primary_diagnosis: Diagnosis,
    pub overall_confidence_score: f64,
    pub generated_at: DateTime<Utc>,
}

/// Snapshot of everything a pipeline run produced, taken when the run ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub case_input: CaseInput,
    pub processed_lab_docs: Vec<LabDocument>,
    pub processed_radiology_docs: Vec<RadiologyDocument>,
    pub case_summary: Option<CaseSummary>,
    pub soap_note: Option<SoapNote>,
    pub primary_diagnosis: Option<Diagnosis>,
    pub medical_insights: Option<MedicalInsights>,
    pub processing_errors: Vec<String>,
    pub processing_stage: String,
    pub confidence_scores: BTreeMap<String, f64>,
}

/// One entity the entity-extraction pipeline should look for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityField {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityExtractionRequest {
    pub document_text: String,
    pub entity_schema: Vec<EntityField>,
}

// HTTP request/response bodies

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUpload {
    pub file_name: String,
    pub file_type: String,
    /// Base64-encoded file bytes.
    pub content_base64: String,
    /// Public URL of the file in object storage, if the uploader already knows it.
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCaseRequest {
    pub user_id: String,
    pub patient_name: String,
    pub patient_age: u32,
    pub patient_gender: String,
    pub case_summary: Option<String>,
    #[serde(default)]
    pub lab_files: Vec<FileUpload>,
    #[serde(default)]
    pub radiology_files: Vec<FileUpload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseStatusResponse {
    pub case_id: String,
    pub status: CaseStatus,
    pub current_stage: Option<String>,
    pub status_message: Option<String>,
    pub insights: Option<crate::store::AiInsightsRow>,
}
