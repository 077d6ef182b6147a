mod common;

use async_trait::async_trait;
use common::*;
use medical_insights_service::dispatch::PipelineDispatcher;
use medical_insights_service::store::{
    AiInsightsRow, CaseFileRecord, CaseRecord, FileMetadata, NewCase,
};
use medical_insights_service::{
    CaseStatus, CaseStore, FileCategory, InMemoryCaseStore, MedicalInsights, PipelineError,
    StoreError,
};
use std::sync::Arc;
use std::time::Duration;

fn chest_film_with_summary() -> RadiologySeed {
    RadiologySeed {
        file_name: "chest.png",
        ai_summary: Some(r#"{"summary":"No acute findings"}"#),
        file_url: None,
    }
}

#[tokio::test]
async fn complete_case_produces_and_stores_insights() {
    let harness = Harness::new(ScriptedGenerator::healthy());
    let request = harness
        .create_case(
            "case-a",
            &[("glucose.txt", "Glucose: 110 mg/dL")],
            &[chest_film_with_summary()],
        )
        .await;

    let outcome = harness.pipeline.run(request).await.unwrap();
    let insights = outcome.result.unwrap();

    assert_eq!(
        insights.case_summary.lab_summary,
        "Fasting glucose mildly elevated at 110 mg/dL"
    );
    assert_eq!(insights.case_summary.radiology_summary, "No acute findings");
    assert_eq!(insights.primary_diagnosis.primary_diagnosis, "Impaired fasting glucose");
    assert_eq!(insights.primary_diagnosis.icd_code.as_deref(), Some("R73.01"));
    assert!((0.0..=1.0).contains(&insights.overall_confidence_score));
    assert!((insights.overall_confidence_score - 0.7).abs() < 1e-9);

    assert!(outcome.state.processing_errors.is_empty());
    assert_eq!(outcome.state.processing_stage, "persist_results");
    assert_eq!(outcome.state.processed_lab_docs.len(), 1);
    assert_eq!(outcome.state.confidence_scores["lab_document:case-a-lab-0"], 0.9);

    let case = harness.store.get_case("case-a").await.unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Completed);

    let stored = harness.store.get_ai_insights("case-a").await.unwrap().unwrap();
    assert_eq!(stored.primary_diagnosis, "Impaired fasting glucose");
    assert_eq!(stored.soap_plan, "Repeat fasting glucose and HbA1c");

    let files = harness.store.get_case_files("case-a").await.unwrap();
    let lab = files.iter().find(|f| f.file_name == "glucose.txt").unwrap();
    assert_eq!(lab.text_data.as_deref(), Some("Glucose: 110 mg/dL"));
}

#[tokio::test]
async fn each_stage_sees_the_output_of_the_previous_one() {
    let harness = Harness::new(ScriptedGenerator::healthy());
    let request = harness
        .create_case("case-order", &[("glucose.txt", "Glucose: 110 mg/dL")], &[])
        .await;

    harness.pipeline.run(request).await.unwrap().result.unwrap();

    let order: Vec<String> = harness
        .generator
        .requests()
        .into_iter()
        .map(|(tag, _)| tag)
        .collect();
    assert_eq!(
        order,
        vec![LAB_PROMPT, CASE_SUMMARY_PROMPT, SOAP_PROMPT, DIAGNOSIS_PROMPT]
    );

    let soap = &harness.generator.requests_for(SOAP_PROMPT)[0];
    let soap_text = soap.user_text().unwrap();
    assert!(soap_text.starts_with("Case Summary: "));
    assert!(soap_text.contains("54-year-old woman with fatigue and mild hyperglycemia"));

    let diagnosis = &harness.generator.requests_for(DIAGNOSIS_PROMPT)[0];
    let diagnosis_text = diagnosis.user_text().unwrap();
    assert!(diagnosis_text.starts_with("SOAP Note: "));
    assert!(diagnosis_text.contains("Impaired fasting glucose"));

    let summary = &harness.generator.requests_for(CASE_SUMMARY_PROMPT)[0];
    let system = summary.system_prompt().unwrap();
    assert!(system.contains("Jane Doe"));
    assert!(system.contains("No radiology data available"));
}

#[tokio::test]
async fn unreadable_lab_file_is_recorded_and_the_run_continues() {
    let harness = Harness::new(ScriptedGenerator::healthy());
    let request = harness
        .create_case(
            "case-b",
            &[
                ("broken.pdf", "CORRUPT bytes"),
                ("glucose.txt", "Glucose: 110 mg/dL"),
            ],
            &[chest_film_with_summary()],
        )
        .await;

    let outcome = harness.pipeline.run(request).await.unwrap();

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.state.processed_lab_docs.len(), 1);
    assert_eq!(outcome.state.processed_lab_docs[0].file_name, "glucose.txt");
    assert_eq!(outcome.state.processing_errors.len(), 1);
    assert!(outcome.state.processing_errors[0].starts_with("text_extraction: broken.pdf"));
    assert!(outcome.state.medical_insights.is_some());

    let case = harness.store.get_case("case-b").await.unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Completed);
}

#[tokio::test]
async fn diagnosis_without_json_fails_the_case() {
    let generator = ScriptedGenerator::healthy().reply_with(
        DIAGNOSIS_PROMPT,
        "The patient most likely has prediabetes.",
    );
    let harness = Harness::new(generator);
    let request = harness
        .create_case(
            "case-c",
            &[("glucose.txt", "Glucose: 110 mg/dL")],
            &[chest_film_with_summary()],
        )
        .await;

    let outcome = harness.pipeline.run(request).await.unwrap();

    match outcome.result {
        Err(PipelineError::Stage { stage, .. }) => assert_eq!(stage, "generate_diagnosis"),
        other => panic!("expected a diagnosis stage failure, got {:?}", other),
    }
    assert_eq!(outcome.state.processing_stage, "failed");
    assert!(outcome.state.soap_note.is_some());
    assert!(outcome.state.primary_diagnosis.is_none());
    assert!(outcome.state.medical_insights.is_none());
    assert!(
        outcome
            .state
            .processing_errors
            .last()
            .unwrap()
            .starts_with("generate_diagnosis: ")
    );

    let case = harness.store.get_case("case-c").await.unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Failed);
    assert!(harness.store.get_ai_insights("case-c").await.unwrap().is_none());
}

#[tokio::test]
async fn plain_text_radiology_summary_is_used_verbatim() {
    let harness = Harness::new(ScriptedGenerator::healthy());
    let request = harness
        .create_case(
            "case-d",
            &[],
            &[RadiologySeed {
                file_name: "chest.png",
                ai_summary: Some("Clear chest X-ray"),
                file_url: None,
            }],
        )
        .await;

    let outcome = harness.pipeline.run(request).await.unwrap();

    assert_eq!(outcome.state.processed_radiology_docs.len(), 1);
    assert_eq!(outcome.state.processed_radiology_docs[0].summary, "Clear chest X-ray");
    let insights = outcome.result.unwrap();
    assert_eq!(insights.case_summary.radiology_summary, "Clear chest X-ray");
    assert_eq!(insights.case_summary.lab_summary, "");
}

#[tokio::test]
async fn vision_summary_is_written_back_before_analysis() {
    let harness = Harness::new(ScriptedGenerator::healthy());
    let request = harness
        .create_case(
            "case-vision",
            &[],
            &[
                RadiologySeed {
                    file_name: "chest.png",
                    ai_summary: None,
                    file_url: Some("https://files.example.org/case-vision/chest.png"),
                },
                RadiologySeed {
                    file_name: "knee.png",
                    ai_summary: None,
                    file_url: None,
                },
            ],
        )
        .await;

    let outcome = harness.pipeline.run(request).await.unwrap();

    let vision = harness.generator.requests_for(VISION);
    assert_eq!(vision.len(), 1);
    assert_eq!(
        vision[0].image_urls(),
        vec!["https://files.example.org/case-vision/chest.png"]
    );

    let files = harness.store.get_case_files("case-vision").await.unwrap();
    let chest = files.iter().find(|f| f.file_name == "chest.png").unwrap();
    let stored: serde_json::Value =
        serde_json::from_str(chest.ai_summary.as_deref().unwrap()).unwrap();
    assert_eq!(stored["summary"], "Mild cardiomegaly without acute findings");

    assert_eq!(outcome.state.processed_radiology_docs.len(), 1);
    assert_eq!(
        outcome.state.processed_radiology_docs[0].summary,
        "Mild cardiomegaly without acute findings"
    );
    assert_eq!(outcome.state.processing_errors.len(), 1);
    assert!(outcome.state.processing_errors[0].starts_with("vision_analysis: knee.png"));
    assert!(outcome.result.is_ok());
}

#[tokio::test]
async fn staged_files_are_removed_on_every_path() {
    let harness = Harness::new(ScriptedGenerator::healthy());
    let request = harness
        .create_case(
            "case-temp",
            &[
                ("report.pdf", "CORRUPT"),
                ("glucose.txt", "Glucose: 110 mg/dL"),
            ],
            &[],
        )
        .await;

    harness.pipeline.run(request).await.unwrap();

    let seen = harness.extractor.seen_paths();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].extension().is_some_and(|ext| ext == "pdf"));
    for path in seen {
        assert!(!path.exists(), "{} was left behind", path.display());
    }
}

#[tokio::test]
async fn terminal_status_cannot_be_changed() {
    let harness = Harness::new(ScriptedGenerator::healthy());
    let request = harness
        .create_case("case-terminal", &[("glucose.txt", "Glucose: 110 mg/dL")], &[])
        .await;

    harness.pipeline.run(request).await.unwrap().result.unwrap();

    let err = harness
        .store
        .update_case_status("case-terminal", CaseStatus::Failed)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

/// Delegates to the in-memory store but refuses to store insights.
struct RejectingInsights(Arc<InMemoryCaseStore>);

#[async_trait]
impl CaseStore for RejectingInsights {
    async fn create_case(&self, case: NewCase) -> Result<CaseRecord, StoreError> {
        self.0.create_case(case).await
    }

    async fn add_case_file(&self, file: CaseFileRecord) -> Result<(), StoreError> {
        self.0.add_case_file(file).await
    }

    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>, StoreError> {
        self.0.get_case(case_id).await
    }

    async fn get_case_files(&self, case_id: &str) -> Result<Vec<CaseFileRecord>, StoreError> {
        self.0.get_case_files(case_id).await
    }

    async fn update_case_file_metadata(
        &self,
        file_id: &str,
        metadata: FileMetadata,
    ) -> Result<(), StoreError> {
        self.0.update_case_file_metadata(file_id, metadata).await
    }

    async fn update_case_status(&self, case_id: &str, status: CaseStatus) -> Result<(), StoreError> {
        self.0.update_case_status(case_id, status).await
    }

    async fn upload_ai_insights(
        &self,
        _case_id: &str,
        _insights: &MedicalInsights,
    ) -> Result<AiInsightsRow, StoreError> {
        Err(StoreError::Backend("connection reset".into()))
    }

    async fn get_ai_insights(&self, case_id: &str) -> Result<Option<AiInsightsRow>, StoreError> {
        self.0.get_ai_insights(case_id).await
    }
}

#[tokio::test]
async fn persistence_failure_fails_the_case() {
    let store = Arc::new(InMemoryCaseStore::new());
    let harness = Harness::build(
        ScriptedGenerator::healthy(),
        store.clone(),
        Arc::new(RejectingInsights(store.clone())),
    );
    let request = harness
        .create_case("case-persist", &[("glucose.txt", "Glucose: 110 mg/dL")], &[])
        .await;

    let outcome = harness.pipeline.run(request).await.unwrap();

    match outcome.result {
        Err(PipelineError::Persistence(message)) => assert!(message.contains("connection reset")),
        other => panic!("expected a persistence failure, got {:?}", other),
    }
    assert!(outcome.state.medical_insights.is_some());
    assert_eq!(outcome.state.processing_stage, "failed");

    let case = store.get_case("case-persist").await.unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Failed);
}

#[tokio::test]
async fn dispatched_case_reaches_a_terminal_status() {
    let harness = Harness::new(ScriptedGenerator::healthy());
    let request = harness
        .create_case("case-queued", &[("glucose.txt", "Glucose: 110 mg/dL")], &[])
        .await;
    let (dispatcher, _worker) = PipelineDispatcher::spawn(harness.pipeline.clone(), 4);

    dispatcher.dispatch(request).unwrap();

    let mut status = CaseStatus::Processing;
    for _ in 0..200 {
        status = harness.store.get_case("case-queued").await.unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, CaseStatus::Completed);
    assert!(harness.store.get_ai_insights("case-queued").await.unwrap().is_some());
    assert!(
        harness
            .pipeline
            .agent()
            .progress("case-queued")
            .await
            .is_none()
    );
    assert!(
        harness
            .store
            .get_case_files("case-queued")
            .await
            .unwrap()
            .iter()
            .all(|f| f.file_category == FileCategory::Lab)
    );
}
