//! atomic-api - HTTP API server for the atomic notes knowledge graph

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use atomic_api::{logging, router, AppState, ServerConfig};
use atomic_core::GenerationBackend;
use atomic_db::{Database, PoolConfig};
use atomic_inference::{
    embedding_backend, EmbeddingMode, LlmExtractionOracle, LlmSummarizer, LlmTimestampMapper,
    OpenAIBackend, OpenAIConfig, WhisperBackend,
};
use atomic_jobs::{
    ChunkedTranscriber, FfmpegSplitter, ProcessNoteHandler, WorkerBuilder, WorkerConfig,
    YoutubeIngestHandler, YtDlpSource,
};
use atomic_pipeline::PipelineOrchestrator;
use atomic_search::SemanticSearch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();

    let config = ServerConfig::from_env();

    info!("Connecting to database...");
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let stores = db.stores();

    // Inference
    let openai = OpenAIConfig::from_env();
    let mode = EmbeddingMode::from_env()?;
    let embedder = embedding_backend(mode, openai.clone())?;
    let generator: Arc<dyn GenerationBackend> = Arc::new(OpenAIBackend::new(openai.clone())?);
    info!(
        embedding_mode = mode.as_str(),
        model = %openai.gen_model,
        base_url = %openai.base_url,
        "Inference configured"
    );

    let orchestrator = PipelineOrchestrator::new(
        stores.notes.clone(),
        stores.graph.clone(),
        Arc::new(LlmExtractionOracle::new(generator.clone())),
        embedder.clone(),
    )
    .with_timestamp_mapper(Arc::new(LlmTimestampMapper::new(generator.clone())));
    let search = SemanticSearch::new(stores.search.clone(), embedder);

    // Background jobs
    let worker_config = WorkerConfig::from_env();
    let worker = if worker_config.enabled {
        let transcriber = ChunkedTranscriber::new(
            Arc::new(WhisperBackend::from_env()),
            Arc::new(FfmpegSplitter::from_env()),
        );
        let youtube = YoutubeIngestHandler::new(
            stores.notes.clone(),
            Arc::new(YtDlpSource::from_env()),
            transcriber,
            Arc::new(LlmSummarizer::new(generator)),
            orchestrator.clone(),
        );
        let worker = WorkerBuilder::new(stores.jobs.clone())
            .with_config(worker_config)
            .with_handler(ProcessNoteHandler::new(orchestrator.clone()))
            .with_handler(youtube)
            .build()
            .await;
        Some(worker.start())
    } else {
        warn!("Job worker disabled (JOB_WORKER_ENABLED=false); queued jobs will not run");
        None
    };

    let state = AppState::new(stores, orchestrator, search).with_database(db);
    let app = router(state, &config.cors_origins);

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(worker) = worker {
        if let Err(e) = worker.shutdown().await {
            warn!(error = %e, "Job worker did not acknowledge shutdown");
        }
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
