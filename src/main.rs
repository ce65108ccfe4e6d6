//! AlgoTest - Application Entry Point
//!
//! Starts the pipeline worker: connects the store, Redis and Docker, recovers
//! tasks interrupted by a previous run, then consumes the job queue until
//! Ctrl-C.

use std::sync::Arc;

use redis::Client as RedisClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use algotest::{
    analyzer::CommandAnalyzer,
    config::Config,
    db::{self, PgStore},
    engine::{ContainerEngine, DockerRuntime},
    pipeline::Orchestrator,
    queue::PipelineWorker,
    report::TemplateRenderer,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log.rust_log.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting AlgoTest worker...");

    // Initialize database connection pool
    tracing::info!("Connecting to database...");
    let pool = db::connection::create_pool(&config.database).await?;

    // Run database migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Initialize Redis connection
    tracing::info!("Connecting to Redis...");
    let redis_client = RedisClient::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;

    // Initialize Docker client
    tracing::info!("Connecting to Docker...");
    let runtime = DockerRuntime::connect(&config.docker)?;

    // Verify Docker connection
    let docker_info = runtime.docker().version().await?;
    tracing::info!(
        "Connected to Docker version: {}",
        docker_info.version.unwrap_or_default()
    );

    let engine = Arc::new(ContainerEngine::new(Arc::new(runtime), config.docker.clone()));
    let analyzer = Arc::new(CommandAnalyzer::new(config.analyzer.clone())?);
    let renderer = Arc::new(TemplateRenderer::from_config(&config.report)?);
    let store = Arc::new(PgStore::new(pool));

    let orchestrator = Orchestrator::new(store, engine, analyzer, renderer, &config.report);
    let state = AppState::new(orchestrator, redis_conn, config);

    // Pick up work a previous process left in flight
    let recovered = state.orchestrator().resume_interrupted().await?;
    for ticket in recovered.resumed {
        tokio::spawn(async move {
            let task_id = ticket.task_id.clone();
            if let Err(e) = ticket.wait().await {
                tracing::warn!(task_id = %task_id, error = %e, "Resumed execution failed");
            }
        });
    }

    let shutdown = CancellationToken::new();
    let worker = PipelineWorker::new(
        state.orchestrator().clone(),
        state.redis(),
        &state.config().redis,
        &state.config().pipeline,
    );
    let worker = tokio::spawn(worker.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown.cancel();
    worker.await??;

    Ok(())
}
