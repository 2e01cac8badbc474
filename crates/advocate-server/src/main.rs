mod error;
mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use advocate_core::audit::AuditLogger;
use advocate_core::case_memory::CaseMemoryStore;
use advocate_core::config::Config;
use advocate_core::corpus_index::CorpusIndex;
use advocate_core::formatter::DefaultFormatter;
use advocate_core::pipeline::Pipeline;
use advocate_core::planner::DeterministicPlanner;
use advocate_core::retriever::CorpusRetriever;
use advocate_core::validator::RuleBasedValidator;
use advocate_llm::{LlmAssistedValidator, LlmClient, LlmReasoner};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct AppState {
    pub config: Arc<Config>,
    pub index: Arc<RwLock<CorpusIndex>>,
    pub case_memory: Arc<CaseMemoryStore>,
    pub start_time: Instant,
    /// Shared across every request's pipeline so its rolling failure-rate
    /// window reflects real history instead of resetting each call; `/health`
    /// reads it directly.
    pub retriever: Arc<CorpusRetriever>,
    /// Bounds concurrent Phase B validator LLM calls across all in-flight
    /// requests; shared rather than per-pipeline since a fresh pipeline is
    /// built per request.
    pub llm_validator_slots: Arc<Semaphore>,
}

impl AppState {
    /// Builds a fresh pipeline with its own audit session. Every external
    /// call to `/query` or `/incidents/{id}/agent` is its own session —
    /// the audit trail is the unit a court would be shown.
    pub fn build_pipeline(&self) -> Pipeline {
        let audit = Arc::new(AuditLogger::new(&self.config.audit_log_dir));

        let retriever = Arc::clone(&self.retriever);

        let llm_client = LlmClient::new(&self.config.llm_api_base, &self.config.llm_api_key);
        let reasoner = Arc::new(LlmReasoner::new(
            LlmClient::new(&self.config.llm_api_base, &self.config.llm_api_key),
            &self.config.llm_model_reasoning,
            self.config.llm_temperature,
        ));

        let validator: Arc<dyn advocate_core::agent::Validator> =
            match self.config.validation_mode {
                advocate_core::config::ValidationMode::RuleOnly => Arc::new(RuleBasedValidator),
                advocate_core::config::ValidationMode::RulePlusLlm => Arc::new(LlmAssistedValidator::new(
                    llm_client,
                    &self.config.llm_model_validator,
                    0.0,
                    Arc::clone(&self.llm_validator_slots),
                )),
            };

        Pipeline::new(
            Arc::new(DeterministicPlanner),
            retriever,
            reasoner,
            validator,
            Arc::new(DefaultFormatter),
            audit,
            self.config.retrieval_max_sources,
            Duration::from_millis(self.config.request_deadline_ms),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "advocate_server=info,advocate_core=info,advocate_llm=info,tower_http=warn".into());

    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();

    let config = Arc::new(Config::from_env()?);

    std::fs::create_dir_all(&config.corpus_index_dir)?;
    std::fs::create_dir_all(&config.audit_log_dir)?;

    let index = Arc::new(RwLock::new(CorpusIndex::load(&config.corpus_index_dir)?));
    let case_memory = Arc::new(CaseMemoryStore::open(&config.case_memory_db)?);

    let retriever = Arc::new(CorpusRetriever::new(Arc::clone(&index)));

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        index,
        case_memory,
        start_time: Instant::now(),
        retriever,
        llm_validator_slots: Arc::new(Semaphore::new(advocate_llm::DEFAULT_MAX_CONCURRENT_VALIDATOR_CALLS)),
    });

    let app = Router::new()
        .route("/query", post(routes::query))
        .route("/incidents/:incident_id/agent", post(routes::incident_agent))
        .route("/audit/:session_id", get(routes::get_audit))
        .route("/export/:session_id", get(routes::export_session))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!(%addr, "starting advocate-server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
