//! The medical insights agent: the fixed seven-stage graph and the driver that
//! runs one case through it, records the outcome and moves the case status.

use async_trait::async_trait;
use graph_flow::{
    Context, FlowRunner, Graph, GraphBuilder, GraphError, InMemorySessionStorage, Session,
    SessionStorage,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::analyzers::LabAnalyzer;
use crate::gateway::GenerationGateway;
use crate::models::{CaseInput, CaseStatus, MedicalInsights, PipelineState};
use crate::store::CaseStore;
use crate::tasks::{
    CompileInsightsTask, GenerateCaseSummaryTask, GenerateDiagnosisTask, GenerateSoapNoteTask,
    PersistResultsTask, ProcessLabDocumentsTask, ProcessRadiologyDocumentsTask, stages, state_keys,
};

pub const MEDICAL_INSIGHTS_GRAPH: &str = "medical_insights";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("persisting insights failed: {0}")]
    Persistence(String),

    #[error("workflow engine error: {0}")]
    Engine(#[from] GraphError),

    #[error("case intake failed: {0}")]
    Intake(String),
}

/// What a finished run leaves behind: the state snapshot, whatever the result.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub result: Result<MedicalInsights, PipelineError>,
}

/// Where a running case currently is in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    pub current_stage: String,
    pub status_message: Option<String>,
}

pub fn build_medical_insights_graph(
    gateway: Arc<GenerationGateway>,
    store: Arc<dyn CaseStore>,
) -> Graph {
    GraphBuilder::new(MEDICAL_INSIGHTS_GRAPH)
        .add_task(Arc::new(ProcessLabDocumentsTask::new(LabAnalyzer::new(gateway.clone()))))
        .add_task(Arc::new(ProcessRadiologyDocumentsTask))
        .add_task(Arc::new(GenerateCaseSummaryTask::new(gateway.clone())))
        .add_task(Arc::new(GenerateSoapNoteTask::new(gateway.clone())))
        .add_task(Arc::new(GenerateDiagnosisTask::new(gateway)))
        .add_task(Arc::new(CompileInsightsTask))
        .add_task(Arc::new(PersistResultsTask::new(store)))
        .add_edge(stages::PROCESS_LAB_DOCUMENTS, stages::PROCESS_RADIOLOGY_DOCUMENTS)
        .add_edge(stages::PROCESS_RADIOLOGY_DOCUMENTS, stages::GENERATE_CASE_SUMMARY)
        .add_edge(stages::GENERATE_CASE_SUMMARY, stages::GENERATE_SOAP_NOTE)
        .add_edge(stages::GENERATE_SOAP_NOTE, stages::GENERATE_DIAGNOSIS)
        .add_edge(stages::GENERATE_DIAGNOSIS, stages::COMPILE_INSIGHTS)
        .add_edge(stages::COMPILE_INSIGHTS, stages::PERSIST_RESULTS)
        .set_start_task(stages::PROCESS_LAB_DOCUMENTS)
        .build()
}

pub struct MedicalInsightsAgent {
    gateway: Arc<GenerationGateway>,
    store: Arc<dyn CaseStore>,
    sessions: Arc<dyn SessionStorage>,
    runner: FlowRunner,
}

impl MedicalInsightsAgent {
    pub fn new(gateway: Arc<GenerationGateway>, store: Arc<dyn CaseStore>) -> Self {
        let sessions: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let graph = Arc::new(build_medical_insights_graph(gateway.clone(), store.clone()));
        let runner = FlowRunner::new(graph, sessions.clone());

        Self {
            gateway,
            store,
            sessions,
            runner,
        }
    }

    pub fn stage_order(&self) -> graph_flow::Result<Vec<String>> {
        self.runner.graph().stage_order()
    }

    /// The stage a case is executing right now, if a run for it is in flight.
    pub async fn progress(&self, case_id: &str) -> Option<StageProgress> {
        let session = self.sessions.get(case_id).await.ok().flatten()?;
        Some(StageProgress {
            current_stage: session.current_task_id,
            status_message: session.status_message,
        })
    }

    /// Run one case to a terminal status. `intake_errors` are file-level errors
    /// collected before the graph starts; they seed the error list.
    ///
    /// The session id is the case id, so a case must not be run twice at once.
    pub async fn execute(&self, input: CaseInput, intake_errors: Vec<String>) -> PipelineOutcome {
        let case_id = input.case_id.clone();
        info!(case_id = %case_id, "starting medical insights pipeline");

        let session = Session::new_from_task(
            case_id.clone(),
            MEDICAL_INSIGHTS_GRAPH,
            stages::PROCESS_LAB_DOCUMENTS,
        );
        let context = session.context.clone();

        let driven = match self.start(session, &input, intake_errors).await {
            Ok(()) => self.drive(&case_id).await,
            Err(e) => Err(PipelineError::Engine(e)),
        };

        let result = match driven {
            Ok(()) => self.finish(&case_id, &context).await,
            Err(e) => Err(e),
        };

        let result = match result {
            Ok(insights) => Ok(insights),
            Err(e) => {
                self.record_failure(&case_id, &context, &e).await;
                Err(e)
            }
        };

        if let Err(e) = self.sessions.delete(&case_id).await {
            warn!(case_id = %case_id, error = %e, "could not drop pipeline session");
        }

        PipelineOutcome {
            state: snapshot(&context, input).await,
            result,
        }
    }

    async fn start(
        &self,
        session: Session,
        input: &CaseInput,
        intake_errors: Vec<String>,
    ) -> graph_flow::Result<()> {
        let context = &session.context;
        context.put(&state_keys::CASE_INPUT, input).await?;
        context.put(&state_keys::PROCESSING_ERRORS, &intake_errors).await?;
        context
            .put(&state_keys::PROCESSING_STAGE, &"initialized".to_string())
            .await?;
        context
            .put(&state_keys::CONFIDENCE_SCORES, &Default::default())
            .await?;
        self.sessions.save(session).await
    }

    /// Run the graph to its end. A failure at `persist_results` is a
    /// persistence failure; anywhere else it belongs to the stage that failed.
    async fn drive(&self, case_id: &str) -> Result<(), PipelineError> {
        let failure = match self.runner.run_to_end(case_id).await {
            Ok(_) => return Ok(()),
            Err(failure) => failure,
        };

        let message = failure.reason();
        match failure.task_id {
            Some(stage) if stage == stages::PERSIST_RESULTS => {
                Err(PipelineError::Persistence(message))
            }
            Some(stage) => Err(PipelineError::Stage { stage, message }),
            None => Err(PipelineError::Engine(failure.error)),
        }
    }

    async fn finish(
        &self,
        case_id: &str,
        context: &Context,
    ) -> Result<MedicalInsights, PipelineError> {
        let insights = context.require(&state_keys::MEDICAL_INSIGHTS).await?;

        // The insights are already stored; a failed status write is only logged.
        if let Err(e) = self.store.update_case_status(case_id, CaseStatus::Completed).await {
            error!(case_id = %case_id, error = %e, "insights stored but case status update failed");
        }

        info!(
            case_id = %case_id,
            overall_confidence = insights.overall_confidence_score,
            "medical insights pipeline completed"
        );
        Ok(insights)
    }

    async fn record_failure(&self, case_id: &str, context: &Context, e: &PipelineError) {
        let entry = match e {
            PipelineError::Stage { stage, message } => format!("{}: {}", stage, message),
            PipelineError::Persistence(message) => {
                format!("{}: {}", stages::PERSIST_RESULTS, message)
            }
            other => other.to_string(),
        };
        error!(case_id = %case_id, error = %entry, "medical insights pipeline failed");

        if let Err(e) = context.append(&state_keys::PROCESSING_ERRORS, entry).await {
            warn!(case_id = %case_id, error = %e, "could not record pipeline error");
        }
        if let Err(e) = context
            .put(&state_keys::PROCESSING_STAGE, &stages::FAILED.to_string())
            .await
        {
            warn!(case_id = %case_id, error = %e, "could not record failed stage");
        }
        if let Err(e) = self.store.update_case_status(case_id, CaseStatus::Failed).await {
            error!(case_id = %case_id, error = %e, "could not mark case as failed");
        }
    }
}

#[async_trait]
impl Agent for MedicalInsightsAgent {
    type Input = CaseInput;
    type Output = MedicalInsights;

    fn build_graph(&self) -> Graph {
        build_medical_insights_graph(self.gateway.clone(), self.store.clone())
    }

    async fn run(&self, input: CaseInput) -> Result<MedicalInsights, PipelineError> {
        self.execute(input, Vec::new()).await.result
    }
}

async fn snapshot(context: &Context, case_input: CaseInput) -> PipelineState {
    PipelineState {
        case_input,
        processed_lab_docs: context
            .fetch(&state_keys::LAB_RESULT)
            .await
            .map(|r| r.documents)
            .unwrap_or_default(),
        processed_radiology_docs: context
            .fetch(&state_keys::RADIOLOGY_RESULT)
            .await
            .map(|r| r.documents)
            .unwrap_or_default(),
        case_summary: context.fetch(&state_keys::CASE_SUMMARY).await,
        soap_note: context.fetch(&state_keys::SOAP_NOTE).await,
        primary_diagnosis: context.fetch(&state_keys::DIAGNOSIS).await,
        medical_insights: context.fetch(&state_keys::MEDICAL_INSIGHTS).await,
        processing_errors: context
            .fetch(&state_keys::PROCESSING_ERRORS)
            .await
            .unwrap_or_default(),
        processing_stage: context
            .fetch(&state_keys::PROCESSING_STAGE)
            .await
            .unwrap_or_default(),
        confidence_scores: context
            .fetch(&state_keys::CONFIDENCE_SCORES)
            .await
            .unwrap_or_default(),
    }
}
