use role_chat_orchestrator::{
    api::{start_server, ApiState},
    auth::JwtAuthenticator,
    config::AppConfig,
    invoker::ProviderInvoker,
    notify::{EmailApiNotifier, LogNotifier, Notifier},
    provider::OpenAiProvider,
    render::GraphvizRenderer,
    service::ChatService,
    store,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    if !config.openai.has_api_key() {
        warn!("OPENAI_API_KEY not set; model requests will be rejected by the provider");
    }

    info!("Role Chat Orchestrator - API Server");
    info!("Port: {}", config.port);
    info!("Model: {}", config.openai.model);

    // Create components
    let stores = store::open(config.database_url.as_deref());
    if config.database_url.is_none() {
        warn!("DATABASE_URL not set; users and history are kept in memory only");
    }

    let provider = Arc::new(OpenAiProvider::new(config.openai.clone())?);
    let invoker = ProviderInvoker::new(provider, config.retry.clone())
        .with_knowledge_base(config.vector_store_id.clone());

    let notifier: Arc<dyn Notifier> = match config.email.clone() {
        Some(email) => Arc::new(EmailApiNotifier::new(email)?),
        None => {
            info!("Email API not configured; decisions will be logged only");
            Arc::new(LogNotifier)
        }
    };

    let service = ChatService::new(
        Arc::new(invoker),
        stores.conversations.clone(),
        Arc::new(GraphvizRenderer::new(config.graph.clone())),
        notifier,
    );

    let state = ApiState {
        service: Arc::new(service),
        auth: Arc::new(JwtAuthenticator::new(&config.jwt_secret, stores.users.clone())),
        graph_dir: config.graph.output_dir.clone(),
        graph_url_prefix: config.graph.url_prefix.clone(),
    };

    info!("Chat service initialized");
    info!("Starting API server...");

    start_server(state, config.port).await?;

    Ok(())
}
