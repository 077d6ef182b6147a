use std::collections::BTreeMap;

/// Stage names double as task ids in the medical insights graph.
pub mod stages {
    pub const PROCESS_LAB_DOCUMENTS: &str = "process_lab_documents";
    pub const PROCESS_RADIOLOGY_DOCUMENTS: &str = "process_radiology_documents";
    pub const GENERATE_CASE_SUMMARY: &str = "generate_case_summary";
    pub const GENERATE_SOAP_NOTE: &str = "generate_soap_note";
    pub const GENERATE_DIAGNOSIS: &str = "generate_diagnosis";
    pub const COMPILE_INSIGHTS: &str = "compile_insights";
    pub const PERSIST_RESULTS: &str = "persist_results";

    /// Label recorded as the processing stage once a run has failed.
    pub const FAILED: &str = "failed";
}

pub mod state_keys {
    use super::*;
    use crate::models::{
        CaseInput, CaseSummary, Diagnosis, LabProcessingResult, MedicalInsights,
        RadiologyProcessingResult, SoapNote,
    };
    use graph_flow::StateKey;

    pub const CASE_INPUT: StateKey<CaseInput> = StateKey::new("case_input");
    pub const LAB_RESULT: StateKey<LabProcessingResult> = StateKey::new("processed_lab_docs");
    pub const RADIOLOGY_RESULT: StateKey<RadiologyProcessingResult> =
        StateKey::new("processed_radiology_docs");
    pub const CASE_SUMMARY: StateKey<CaseSummary> = StateKey::new("case_summary");
    pub const SOAP_NOTE: StateKey<SoapNote> = StateKey::new("soap_note");
    pub const DIAGNOSIS: StateKey<Diagnosis> = StateKey::new("primary_diagnosis");
    pub const MEDICAL_INSIGHTS: StateKey<MedicalInsights> = StateKey::new("medical_insights");

    pub const PROCESSING_ERRORS: StateKey<Vec<String>> = StateKey::new("processing_errors");
    pub const PROCESSING_STAGE: StateKey<String> = StateKey::new("processing_stage");
    pub const CONFIDENCE_SCORES: StateKey<BTreeMap<String, f64>> =
        StateKey::new("confidence_scores");
}
