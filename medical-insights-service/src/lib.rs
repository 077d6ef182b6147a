pub mod agent;
pub mod analyzers;
pub mod confidence;
pub mod config;
pub mod dispatch;
pub mod entity_workflow;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod service;
pub mod store;
pub mod tasks;
pub mod text_extraction;
pub mod vision;
pub mod workflow;

pub use agent::Agent;
pub use config::ServiceConfig;
pub use entity_workflow::EntityExtractionAgent;
pub use gateway::{GatewayError, GenerationGateway, GenerationService, GenerationSettings, OpenRouterService};
pub use models::*;
pub use pipeline::{CasePipeline, PipelineRequest, UploadedFile};
pub use service::{AppState, build_router, create_app_state};
pub use store::{CaseStore, InMemoryCaseStore, PostgresCaseStore, StoreError};
pub use workflow::{MedicalInsightsAgent, PipelineError, PipelineOutcome};
