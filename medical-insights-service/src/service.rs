use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::dispatch::{DispatchError, PipelineDispatcher};
use crate::entity_workflow::EntityExtractionAgent;
use crate::gateway::GenerationGateway;
use crate::models::{
    CaseStatus, CaseStatusResponse, CreateCaseRequest, EntityExtractionRequest, FileCategory,
    FileUpload, PatientData,
};
use crate::pipeline::{CasePipeline, PipelineRequest, UploadedFile};
use crate::store::{CaseFileRecord, CaseStore, NewCase};
use crate::text_extraction::TextExtractor;
use crate::vision::VisionSubPipeline;
use crate::workflow::{MedicalInsightsAgent, PipelineError};

type ApiResult<T> = Result<(StatusCode, Json<T>), ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "case_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CaseStore>,
    pub insights_agent: Arc<MedicalInsightsAgent>,
    pub entity_agent: Arc<EntityExtractionAgent>,
    pub dispatcher: PipelineDispatcher,
}

/// Wire the collaborators into the agents, the intake pipeline and its
/// dispatcher. The returned handle is the dispatcher's worker.
pub fn create_app_state(
    store: Arc<dyn CaseStore>,
    gateway: Arc<GenerationGateway>,
    extractor: Arc<dyn TextExtractor>,
    queue_capacity: usize,
) -> (AppState, JoinHandle<()>) {
    let insights_agent = Arc::new(MedicalInsightsAgent::new(gateway.clone(), store.clone()));
    let vision = VisionSubPipeline::new(gateway.clone(), store.clone());
    let pipeline = Arc::new(CasePipeline::new(
        store.clone(),
        extractor,
        vision,
        insights_agent.clone(),
    ));
    let (dispatcher, worker) = PipelineDispatcher::spawn(pipeline, queue_capacity);

    let state = AppState {
        store,
        insights_agent,
        entity_agent: Arc::new(EntityExtractionAgent::new(gateway)),
        dispatcher,
    };
    (state, worker)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/cases", post(create_case))
        .route("/cases/{case_id}", get(get_case_status))
        .route("/entities/extract", post(extract_entities))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical Insights Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Case summaries, SOAP notes and primary diagnoses generated from lab documents, radiology images and doctor notes",
        "endpoints": {
            "POST /cases": "Create a case and start insight generation",
            "GET /cases/{case_id}": "Get case status and insights",
            "POST /entities/extract": "Extract schema entities from document text",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_case(
    State(state): State<AppState>,
    Json(request): Json<CreateCaseRequest>,
) -> ApiResult<Value> {
    validate_case_request(&request)?;

    let case_id = Uuid::new_v4().to_string();
    let lab_files = decode_uploads(&request.lab_files)?;
    let radiology_files = decode_uploads(&request.radiology_files)?;
    info!(
        case_id = %case_id,
        lab_files = lab_files.len(),
        radiology_files = radiology_files.len(),
        "creating case"
    );

    state
        .store
        .create_case(NewCase {
            case_id: case_id.clone(),
            user_id: request.user_id.clone(),
            patient: PatientData {
                name: request.patient_name.clone(),
                age: request.patient_age,
                gender: request.patient_gender.clone(),
            },
            case_summary: request.case_summary.clone(),
        })
        .await
        .map_err(|e| {
            error!(error = %e, "failed to create case");
            internal_error("Failed to create case", &e.to_string())
        })?;

    let uploads = request
        .lab_files
        .iter()
        .zip(&lab_files)
        .map(|(upload, file)| (FileCategory::Lab, upload, file))
        .chain(
            request
                .radiology_files
                .iter()
                .zip(&radiology_files)
                .map(|(upload, file)| (FileCategory::Radiology, upload, file)),
        );
    for (category, upload, file) in uploads {
        let record = CaseFileRecord {
            file_id: file.file_id.clone(),
            case_id: case_id.clone(),
            file_name: file.file_name.clone(),
            file_type: file.file_type.clone(),
            file_url: upload.file_url.clone().filter(|url| !url.trim().is_empty()),
            file_category: category,
            text_data: None,
            ai_summary: None,
        };
        state.store.add_case_file(record).await.map_err(|e| {
            error!(case_id = %case_id, error = %e, "failed to store case file");
            internal_error("Failed to store case file", &e.to_string())
        })?;
    }

    let pipeline_request = PipelineRequest {
        case_id: case_id.clone(),
        user_id: request.user_id,
        patient_name: request.patient_name,
        patient_age: request.patient_age,
        patient_gender: request.patient_gender,
        case_summary: request.case_summary,
        lab_files,
        radiology_files,
    };

    if let Err(e) = state.dispatcher.dispatch(pipeline_request) {
        warn!(case_id = %case_id, error = %e, "could not enqueue pipeline");
        if let Err(status_error) = state
            .store
            .update_case_status(&case_id, CaseStatus::Failed)
            .await
        {
            error!(case_id = %case_id, error = %status_error, "could not mark case as failed");
        }
        let status = match e {
            DispatchError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::WorkerStopped => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return Err((status, Json(json!({ "error": e.to_string(), "case_id": case_id }))));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "case_id": case_id,
            "status": CaseStatus::Processing,
            "message": "Case created, insight generation started"
        })),
    ))
}

fn validate_case_request(request: &CreateCaseRequest) -> Result<(), ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(bad_request_error("user_id is required"));
    }
    if request.patient_name.trim().is_empty() {
        return Err(bad_request_error("patient_name is required"));
    }
    Ok(())
}

fn decode_uploads(uploads: &[FileUpload]) -> Result<Vec<UploadedFile>, ApiError> {
    uploads
        .iter()
        .map(|upload| {
            let file_content = STANDARD.decode(upload.content_base64.trim()).map_err(|_| {
                bad_request_error(&format!("{} is not valid base64", upload.file_name))
            })?;
            Ok(UploadedFile {
                file_id: Uuid::new_v4().to_string(),
                file_name: upload.file_name.clone(),
                file_content,
                file_type: upload.file_type.clone(),
            })
        })
        .collect()
}

async fn get_case_status(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ApiResult<CaseStatusResponse> {
    let case = state
        .store
        .get_case(&case_id)
        .await
        .map_err(|e| {
            error!(case_id = %case_id, error = %e, "failed to load case");
            internal_error("Failed to load case", &e.to_string())
        })?
        .ok_or_else(|| not_found_error("Case not found", &case_id))?;

    let progress = state.insights_agent.progress(&case_id).await;
    let insights = if case.status == CaseStatus::Completed {
        state.store.get_ai_insights(&case_id).await.map_err(|e| {
            error!(case_id = %case_id, error = %e, "failed to load insights");
            internal_error("Failed to load insights", &e.to_string())
        })?
    } else {
        None
    };

    Ok((
        StatusCode::OK,
        Json(CaseStatusResponse {
            case_id: case.case_id,
            status: case.status,
            current_stage: progress.as_ref().map(|p| p.current_stage.clone()),
            status_message: progress.and_then(|p| p.status_message),
            insights,
        }),
    ))
}

async fn extract_entities(
    State(state): State<AppState>,
    Json(request): Json<EntityExtractionRequest>,
) -> ApiResult<Value> {
    if request.document_text.trim().is_empty() {
        return Err(bad_request_error("document_text is required"));
    }
    if request.entity_schema.is_empty() {
        return Err(bad_request_error("entity_schema must name at least one entity"));
    }

    match state.entity_agent.run(request).await {
        Ok(entities) => Ok((StatusCode::OK, Json(json!({ "entities": entities })))),
        Err(PipelineError::Stage { stage, message }) => {
            warn!(stage = %stage, error = %message, "entity extraction failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Entity extraction failed", "stage": stage })),
            ))
        }
        Err(e) => Err(internal_error("Entity extraction failed", &e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GenerationRequest, GenerationService, GenerationSettings};
    use crate::store::InMemoryCaseStore;
    use crate::text_extraction::ExtractionOutcome;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    struct EchoEntities;

    #[async_trait]
    impl GenerationService for EchoEntities {
        async fn complete(&self, request: GenerationRequest) -> anyhow::Result<String> {
            let system = request.system_prompt().unwrap_or_default();
            if system.starts_with("Extract entities") {
                Ok(r#"{"entities": {"medication": [{"value": "metformin"}]}}"#.to_string())
            } else {
                Ok(r#"{"ok": true}"#.to_string())
            }
        }
    }

    struct NoText;

    #[async_trait]
    impl TextExtractor for NoText {
        async fn extract_text(&self, _path: &std::path::Path) -> ExtractionOutcome {
            ExtractionOutcome::error("not used")
        }
    }

    /// Answers vision calls with a radiology summary and every text stage with
    /// a reply that satisfies it, recording the image URLs it was sent.
    #[derive(Default)]
    struct ClinicalReplies {
        image_urls: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationService for ClinicalReplies {
        async fn complete(&self, request: GenerationRequest) -> anyhow::Result<String> {
            if request.vision {
                self.image_urls
                    .lock()
                    .unwrap()
                    .extend(request.image_urls().into_iter().map(str::to_string));
                return Ok(r#"{"summary": "No acute cardiopulmonary findings", "confidence": 0.9}"#.to_string());
            }
            Ok(r#"{"summary": "Stable", "diagnosis": "No acute disease", "confidence": 0.8}"#.to_string())
        }
    }

    fn app_with(service: Arc<dyn GenerationService>) -> (Router, Arc<InMemoryCaseStore>) {
        let store = Arc::new(InMemoryCaseStore::new());
        let gateway = Arc::new(GenerationGateway::new(service, GenerationSettings::default()));
        let (state, _worker) = create_app_state(store.clone(), gateway, Arc::new(NoText), 8);
        (build_router(state), store)
    }

    fn app() -> (Router, Arc<InMemoryCaseStore>) {
        app_with(Arc::new(EchoEntities))
    }

    async fn wait_until_settled(store: &InMemoryCaseStore, case_id: &str) -> CaseStatus {
        for _ in 0..200 {
            let status = store.get_case(case_id).await.unwrap().unwrap().status;
            if status != CaseStatus::Processing {
                return status;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("case {} never left processing", case_id);
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn unknown_case_is_not_found() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/cases/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_base64_is_rejected_before_anything_is_stored() {
        let (app, store) = app();
        let response = app
            .oneshot(post_json(
                "/cases",
                json!({
                    "user_id": "doctor-1",
                    "patient_name": "Jane Doe",
                    "patient_age": 54,
                    "patient_gender": "female",
                    "case_summary": null,
                    "lab_files": [{"file_name": "cbc.txt", "file_type": "text/plain", "content_base64": "***", "file_url": null}]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.get_case_files("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn case_creation_is_accepted_and_stored_as_processing_or_later() {
        let (app, store) = app();
        let response = app
            .oneshot(post_json(
                "/cases",
                json!({
                    "user_id": "doctor-1",
                    "patient_name": "Jane Doe",
                    "patient_age": 54,
                    "patient_gender": "female",
                    "case_summary": "Fatigue",
                    "radiology_files": [{
                        "file_name": "chest.png",
                        "file_type": "image/png",
                        "content_base64": "aGVsbG8=",
                        "file_url": "https://files.example/chest.png"
                    }]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        let case_id = body["case_id"].as_str().unwrap();
        assert!(store.get_case(case_id).await.unwrap().is_some());
        let files = store.get_case_files(case_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_category, FileCategory::Radiology);
        assert_eq!(files[0].file_url.as_deref(), Some("https://files.example/chest.png"));
    }

    #[tokio::test]
    async fn uploaded_radiology_image_without_url_is_sent_inline_to_vision() {
        let replies = Arc::new(ClinicalReplies::default());
        let (app, store) = app_with(replies.clone());
        let response = app
            .oneshot(post_json(
                "/cases",
                json!({
                    "user_id": "doctor-1",
                    "patient_name": "Jane Doe",
                    "patient_age": 54,
                    "patient_gender": "female",
                    "case_summary": "Shortness of breath",
                    "radiology_files": [{
                        "file_name": "chest.png",
                        "file_type": "image/png",
                        "content_base64": "iVBORw0KGgo=",
                        "file_url": null
                    }]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        let case_id = body["case_id"].as_str().unwrap();

        assert_eq!(wait_until_settled(&store, case_id).await, CaseStatus::Completed);
        assert_eq!(
            *replies.image_urls.lock().unwrap(),
            vec!["data:image/png;base64,iVBORw0KGgo=".to_string()]
        );

        let files = store.get_case_files(case_id).await.unwrap();
        assert_eq!(files[0].file_url, None);
        let ai_summary: Value = serde_json::from_str(files[0].ai_summary.as_deref().unwrap()).unwrap();
        assert_eq!(ai_summary["summary"], "No acute cardiopulmonary findings");

        let insights = store.get_ai_insights(case_id).await.unwrap().unwrap();
        assert!(insights.radiology_summary.contains("No acute cardiopulmonary findings"));
    }

    #[tokio::test]
    async fn entities_are_extracted() {
        let (app, _) = app();
        let response = app
            .oneshot(post_json(
                "/entities/extract",
                json!({
                    "document_text": "Patient takes metformin 500mg twice daily.",
                    "entity_schema": [{"name": "medication", "description": "Drugs the patient takes"}]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["entities"]["entities"]["medication"][0]["value"], "metformin");
    }

    #[tokio::test]
    async fn entity_request_needs_a_schema() {
        let (app, _) = app();
        let response = app
            .oneshot(post_json(
                "/entities/extract",
                json!({ "document_text": "text", "entity_schema": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
