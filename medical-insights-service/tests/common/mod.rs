#![allow(dead_code)]

use async_trait::async_trait;
use medical_insights_service::gateway::{GenerationRequest, GenerationService, GenerationSettings};
use medical_insights_service::store::{CaseFileRecord, NewCase};
use medical_insights_service::text_extraction::{ExtractionOutcome, TextExtractor};
use medical_insights_service::vision::VisionSubPipeline;
use medical_insights_service::{
    CasePipeline, CaseStore, FileCategory, GenerationGateway, InMemoryCaseStore,
    MedicalInsightsAgent, PatientData, PipelineRequest, UploadedFile,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const LAB_PROMPT: &str = "Analyze the provided laboratory document";
pub const CASE_SUMMARY_PROMPT: &str = "Generate a comprehensive medical case summary";
pub const SOAP_PROMPT: &str = "Generate a SOAP note";
pub const DIAGNOSIS_PROMPT: &str = "Determine the primary diagnosis";
pub const VISION: &str = "vision";

/// Answers each stage by the opening words of its prompt and records every request.
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<&'static str, String>>,
    requests: Mutex<Vec<(String, GenerationRequest)>>,
}

impl ScriptedGenerator {
    pub fn healthy() -> Self {
        let replies = HashMap::from([
            (
                LAB_PROMPT,
                r#"```json
{"lab_values": {"Glucose": {"value": 110, "unit": "mg/dL", "reference_range": "70-99", "status": "abnormal"}},
 "summary": "Fasting glucose mildly elevated at 110 mg/dL",
 "key_abnormalities": ["Glucose 110 mg/dL"],
 "confidence_score": 0.9}
```"#
                .to_string(),
            ),
            (
                CASE_SUMMARY_PROMPT,
                r#"Here is the summary: {"summary": "54-year-old woman with fatigue and mild hyperglycemia", "key_findings": ["Glucose 110 mg/dL"], "confidence_score": 0.8}"#
                    .to_string(),
            ),
            (
                SOAP_PROMPT,
                r#"{"subjective": "Three weeks of fatigue", "objective": "Glucose 110 mg/dL", "assessment": "Impaired fasting glucose", "plan": "Repeat fasting glucose and HbA1c", "confidence_score": 0.7}"#
                    .to_string(),
            ),
            (
                DIAGNOSIS_PROMPT,
                r#"```json
{"diagnosis": "Impaired fasting glucose", "icd_code": "R73.01", "description": "Fasting glucose between 100 and 125 mg/dL", "supporting_evidence": ["Glucose 110 mg/dL"], "confidence_score": 0.6}
```"#
                    .to_string(),
            ),
            (
                VISION,
                r#"{"findings": "Mild cardiomegaly", "impressions": "No acute process", "summary": "Mild cardiomegaly without acute findings", "key_abnormalities": [], "confidence_score": 0.85}"#
                    .to_string(),
            ),
        ]);

        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reply_with(self, prompt: &'static str, reply: &str) -> Self {
        self.replies.lock().unwrap().insert(prompt, reply.to_string());
        self
    }

    /// Requests in call order, each tagged with the stage prompt that matched.
    pub fn requests(&self) -> Vec<(String, GenerationRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, prompt: &str) -> Vec<GenerationRequest> {
        self.requests()
            .into_iter()
            .filter(|(tag, _)| tag == prompt)
            .map(|(_, request)| request)
            .collect()
    }

    fn route(request: &GenerationRequest) -> &'static str {
        if request.vision {
            return VISION;
        }
        let system = request.system_prompt().unwrap_or_default();
        [LAB_PROMPT, CASE_SUMMARY_PROMPT, SOAP_PROMPT, DIAGNOSIS_PROMPT]
            .into_iter()
            .find(|prefix| system.starts_with(prefix))
            .unwrap_or("unknown")
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn complete(&self, request: GenerationRequest) -> anyhow::Result<String> {
        let tag = Self::route(&request);
        self.requests
            .lock()
            .unwrap()
            .push((tag.to_string(), request));
        self.replies
            .lock()
            .unwrap()
            .get(tag)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted reply for {}", tag))
    }
}

/// Reads staged files as text; content containing "CORRUPT" fails extraction.
#[derive(Default)]
pub struct ScriptedExtractor {
    seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedExtractor {
    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextExtractor for ScriptedExtractor {
    async fn extract_text(&self, path: &Path) -> ExtractionOutcome {
        self.seen.lock().unwrap().push(path.to_path_buf());
        match std::fs::read_to_string(path) {
            Ok(text) if text.contains("CORRUPT") => ExtractionOutcome::error("unreadable document"),
            Ok(text) => ExtractionOutcome::success(text),
            Err(e) => ExtractionOutcome::error(e.to_string()),
        }
    }
}

pub struct RadiologySeed {
    pub file_name: &'static str,
    pub ai_summary: Option<&'static str>,
    pub file_url: Option<&'static str>,
}

pub struct Harness {
    pub store: Arc<InMemoryCaseStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub extractor: Arc<ScriptedExtractor>,
    pub pipeline: Arc<CasePipeline>,
}

impl Harness {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_store(generator, Arc::new(InMemoryCaseStore::new()))
    }

    pub fn with_store(generator: ScriptedGenerator, store: Arc<InMemoryCaseStore>) -> Self {
        Self::build(generator, store.clone(), store)
    }

    /// `case_store` is what the pipeline writes through; `store` is kept for assertions.
    pub fn build(
        generator: ScriptedGenerator,
        store: Arc<InMemoryCaseStore>,
        case_store: Arc<dyn CaseStore>,
    ) -> Self {
        let generator = Arc::new(generator);
        let extractor = Arc::new(ScriptedExtractor::default());
        let gateway = Arc::new(GenerationGateway::new(
            generator.clone(),
            GenerationSettings::default(),
        ));
        let agent = Arc::new(MedicalInsightsAgent::new(gateway.clone(), case_store.clone()));
        let vision = VisionSubPipeline::new(gateway, case_store.clone());
        let pipeline = Arc::new(CasePipeline::new(case_store, extractor.clone(), vision, agent));

        Self {
            store,
            generator,
            extractor,
            pipeline,
        }
    }

    /// Persist a case and its file records the way the HTTP boundary does, and
    /// return the matching pipeline request.
    pub async fn create_case(
        &self,
        case_id: &str,
        lab_files: &[(&str, &str)],
        radiology_files: &[RadiologySeed],
    ) -> PipelineRequest {
        let patient = PatientData {
            name: "Jane Doe".into(),
            age: 54,
            gender: "female".into(),
        };
        self.store
            .create_case(NewCase {
                case_id: case_id.into(),
                user_id: "doctor-1".into(),
                patient: patient.clone(),
                case_summary: Some("Three weeks of fatigue".into()),
            })
            .await
            .unwrap();

        let mut uploads = Vec::new();
        for (index, (file_name, content)) in lab_files.iter().enumerate() {
            let file_id = format!("{}-lab-{}", case_id, index);
            self.store
                .add_case_file(CaseFileRecord {
                    file_id: file_id.clone(),
                    case_id: case_id.into(),
                    file_name: file_name.to_string(),
                    file_type: "text/plain".into(),
                    file_url: None,
                    file_category: FileCategory::Lab,
                    text_data: None,
                    ai_summary: None,
                })
                .await
                .unwrap();
            uploads.push(UploadedFile {
                file_id,
                file_name: file_name.to_string(),
                file_content: content.as_bytes().to_vec(),
                file_type: "text/plain".into(),
            });
        }

        let mut radiology_uploads = Vec::new();
        for (index, seed) in radiology_files.iter().enumerate() {
            let file_id = format!("{}-rad-{}", case_id, index);
            self.store
                .add_case_file(CaseFileRecord {
                    file_id: file_id.clone(),
                    case_id: case_id.into(),
                    file_name: seed.file_name.to_string(),
                    file_type: "image/png".into(),
                    file_url: seed.file_url.map(str::to_string),
                    file_category: FileCategory::Radiology,
                    text_data: None,
                    ai_summary: seed.ai_summary.map(str::to_string),
                })
                .await
                .unwrap();
            radiology_uploads.push(UploadedFile {
                file_id,
                file_name: seed.file_name.to_string(),
                file_content: Vec::new(),
                file_type: "image/png".into(),
            });
        }

        PipelineRequest {
            case_id: case_id.into(),
            user_id: "doctor-1".into(),
            patient_name: patient.name,
            patient_age: patient.age,
            patient_gender: patient.gender,
            case_summary: Some("Three weeks of fatigue".into()),
            lab_files: uploads,
            radiology_files: radiology_uploads,
        }
    }
}
