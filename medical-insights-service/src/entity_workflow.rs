use async_trait::async_trait;
use graph_flow::{FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Session, SessionStorage};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::gateway::GenerationGateway;
use crate::models::EntityExtractionRequest;
use crate::tasks::entities::{
    ANALYZE_DOMAIN, AnalyzeDomainTask, ENTITY_REQUEST, EXTRACT_ENTITIES, EXTRACTED_ENTITIES,
    ExtractEntitiesTask, GENERATE_EXTRACTION_RULES, GenerateExtractionRulesTask,
};
use crate::workflow::PipelineError;

pub const ENTITY_EXTRACTION_GRAPH: &str = "entity_extraction";

pub fn build_entity_extraction_graph(gateway: Arc<GenerationGateway>) -> Graph {
    GraphBuilder::new(ENTITY_EXTRACTION_GRAPH)
        .add_task(Arc::new(AnalyzeDomainTask::new(gateway.clone())))
        .add_task(Arc::new(GenerateExtractionRulesTask::new(gateway.clone())))
        .add_task(Arc::new(ExtractEntitiesTask::new(gateway)))
        .add_edge(ANALYZE_DOMAIN, GENERATE_EXTRACTION_RULES)
        .add_edge(GENERATE_EXTRACTION_RULES, EXTRACT_ENTITIES)
        .set_start_task(ANALYZE_DOMAIN)
        .build()
}

/// Schema-driven entity extraction from free document text.
pub struct EntityExtractionAgent {
    gateway: Arc<GenerationGateway>,
    sessions: Arc<dyn SessionStorage>,
    runner: FlowRunner,
}

impl EntityExtractionAgent {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        let sessions: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let graph = Arc::new(build_entity_extraction_graph(gateway.clone()));
        let runner = FlowRunner::new(graph, sessions.clone());
        Self {
            gateway,
            sessions,
            runner,
        }
    }
}

#[async_trait]
impl Agent for EntityExtractionAgent {
    type Input = EntityExtractionRequest;
    type Output = Value;

    fn build_graph(&self) -> Graph {
        build_entity_extraction_graph(self.gateway.clone())
    }

    async fn run(&self, input: EntityExtractionRequest) -> Result<Value, PipelineError> {
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new_from_task(session_id.clone(), ENTITY_EXTRACTION_GRAPH, ANALYZE_DOMAIN);
        let context = session.context.clone();

        context.put(&ENTITY_REQUEST, &input).await?;
        self.sessions.save(session).await?;
        info!(session_id = %session_id, fields = input.entity_schema.len(), "starting entity extraction");

        let outcome = self.runner.run_to_end(&session_id).await.map_err(|failure| {
            warn!(session_id = %session_id, error = %failure, "entity extraction failed");
            let message = failure.reason();
            match failure.task_id {
                Some(stage) => PipelineError::Stage { stage, message },
                None => PipelineError::Engine(failure.error),
            }
        });

        if let Err(e) = self.sessions.delete(&session_id).await {
            warn!(session_id = %session_id, error = %e, "could not drop entity session");
        }

        outcome?;
        Ok(context.require(&EXTRACTED_ENTITIES).await?)
    }
}
