//! Stages of the entity-extraction pipeline: domain analysis, extraction
//! rules, then the extraction itself. Each stage needs a JSON object back.

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, StateKey, Task, TaskResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::{require_object, stage_failed};
use crate::gateway::GenerationGateway;
use crate::models::EntityExtractionRequest;
use crate::prompts::{DOMAIN_ANALYSIS_PROMPT, ENTITY_EXTRACTION_PROMPT, EXTRACTION_RULES_PROMPT};

pub const ANALYZE_DOMAIN: &str = "analyze_domain";
pub const GENERATE_EXTRACTION_RULES: &str = "generate_extraction_rules";
pub const EXTRACT_ENTITIES: &str = "extract_entities";

/// Domain analysis only looks at the head of the document.
const DOMAIN_SAMPLE_CHARS: usize = 5000;

pub const ENTITY_REQUEST: StateKey<EntityExtractionRequest> = StateKey::new("entity_request");
pub const DOMAIN_ANALYSIS: StateKey<Value> = StateKey::new("domain_analysis");
pub const EXTRACTION_RULES: StateKey<Value> = StateKey::new("extraction_rules");
pub const EXTRACTED_ENTITIES: StateKey<Value> = StateKey::new("extracted_entities");

fn schema_json(request: &EntityExtractionRequest) -> Result<String> {
    serde_json::to_string(&request.entity_schema).map_err(stage_failed)
}

pub struct AnalyzeDomainTask {
    gateway: Arc<GenerationGateway>,
}

impl AnalyzeDomainTask {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Task for AnalyzeDomainTask {
    fn id(&self) -> &str {
        ANALYZE_DOMAIN
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let request = context.require(&ENTITY_REQUEST).await?;
        let sample: String = request.document_text.chars().take(DOMAIN_SAMPLE_CHARS).collect();

        let response = self
            .gateway
            .invoke(DOMAIN_ANALYSIS_PROMPT, &[], &sample)
            .await
            .map_err(stage_failed)?;
        let analysis = require_object(response)?;

        let domain = analysis
            .get("primary_domain")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(domain = %domain, "document domain analyzed");
        context.put(&DOMAIN_ANALYSIS, &Value::Object(analysis)).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some("Domain analyzed".to_string()),
        ))
    }
}

pub struct GenerateExtractionRulesTask {
    gateway: Arc<GenerationGateway>,
}

impl GenerateExtractionRulesTask {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Task for GenerateExtractionRulesTask {
    fn id(&self) -> &str {
        GENERATE_EXTRACTION_RULES
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let request = context.require(&ENTITY_REQUEST).await?;
        let domain_analysis = context.require(&DOMAIN_ANALYSIS).await?.to_string();
        let entity_schema = schema_json(&request)?;

        let response = self
            .gateway
            .invoke(
                EXTRACTION_RULES_PROMPT,
                &[
                    ("domain_analysis", domain_analysis.as_str()),
                    ("entity_schema", entity_schema.as_str()),
                ],
                "Design the extraction strategy.",
            )
            .await
            .map_err(stage_failed)?;
        let rules = require_object(response)?;

        context.put(&EXTRACTION_RULES, &Value::Object(rules)).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some("Extraction rules generated".to_string()),
        ))
    }
}

pub struct ExtractEntitiesTask {
    gateway: Arc<GenerationGateway>,
}

impl ExtractEntitiesTask {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Task for ExtractEntitiesTask {
    fn id(&self) -> &str {
        EXTRACT_ENTITIES
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let request = context.require(&ENTITY_REQUEST).await?;
        let extraction_rules = context.require(&EXTRACTION_RULES).await?.to_string();
        let schema = schema_json(&request)?;

        let response = self
            .gateway
            .invoke(
                ENTITY_EXTRACTION_PROMPT,
                &[
                    ("schema", schema.as_str()),
                    ("extraction_rules", extraction_rules.as_str()),
                ],
                &request.document_text,
            )
            .await
            .map_err(stage_failed)?;
        let entities = require_object(response)?;

        info!(fields = entities.len(), "entities extracted");
        context.put(&EXTRACTED_ENTITIES, &Value::Object(entities)).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::End,
            Some("Entities extracted".to_string()),
        ))
    }
}
