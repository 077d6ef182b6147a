use medical_insights_service::{
    CaseStore, GenerationGateway, GenerationSettings, InMemoryCaseStore, OpenRouterService,
    PostgresCaseStore, ServiceConfig, build_router, create_app_state,
    text_extraction::DocumentTextExtractor,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "medical_insights_service=debug,graph_flow=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

async fn create_case_store(config: &ServiceConfig) -> Arc<dyn CaseStore> {
    match config.database_url.as_deref() {
        Some(database_url) => {
            info!("Using PostgreSQL case store");
            match PostgresCaseStore::connect(database_url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(
                        "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                        e
                    );
                    Arc::new(InMemoryCaseStore::new())
                }
            }
        }
        None => {
            info!("Using in-memory case store (set DATABASE_URL to use PostgreSQL)");
            Arc::new(InMemoryCaseStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServiceConfig::from_env()?;
    let store = create_case_store(&config).await;

    let service = Arc::new(OpenRouterService::new(&config)?);
    let gateway = Arc::new(GenerationGateway::new(
        service,
        GenerationSettings::from(&config),
    ));
    let extractor = Arc::new(DocumentTextExtractor::new(gateway.clone()));

    let (app_state, _worker) =
        create_app_state(store, gateway, extractor, config.queue_capacity);
    let app = build_router(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;
    info!("Medical Insights Service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Case endpoint: POST http://{}/cases", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
