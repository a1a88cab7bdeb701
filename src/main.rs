use std::sync::Arc;

use mentor_agent::agent::{AgentDeps, AgentService};
use mentor_agent::api::{ApiState, api_routes};
use mentor_agent::config::AppConfig;
use mentor_agent::context::LearnerContext;
use mentor_agent::knowledge::KnowledgeGraph;
use mentor_agent::llm::{LlmConfig, create_provider};
use mentor_agent::store::{CheckpointStore, LibSqlBackend, ProfileStore};
use mentor_agent::tools::ToolRegistry;
use mentor_agent::tools::builtin::register_builtin_tools;
use mentor_agent::workflow::RunScope;

#[tokio::main]
async fn main() -> mentor_agent::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export OPENAI_API_KEY=sk-...");
        eprintln!("  export MENTOR_GRAPH_PATH=./data/knowledge_graph.json");
        std::process::exit(1);
    });

    eprintln!("Mentor agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Graph: {}", config.graph_path.display());
    eprintln!("   API: http://0.0.0.0:{}", config.http_port);
    eprintln!("   Thread: {} (user: {})", config.thread_id, config.user_id);

    let llm = create_provider(&LlmConfig::from(&config))?;

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path.display());
    let profiles: Arc<dyn ProfileStore> = db.clone();
    let checkpoints: Arc<dyn CheckpointStore> = db;

    // ── Knowledge graph ──────────────────────────────────────────────────
    let graph = Arc::new(KnowledgeGraph::new(&config.graph_path));
    if let Err(e) = graph.concepts().await {
        eprintln!("   Warning: {}", e);
    }

    // ── Tools ────────────────────────────────────────────────────────────
    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry, Arc::clone(&profiles), Arc::clone(&graph))?;
    eprintln!("   Tools: {} registered\n", registry.count());

    // ── Agent ────────────────────────────────────────────────────────────
    let service = AgentService::new(
        AgentDeps {
            llm,
            store: checkpoints,
            registry,
            learner: Arc::new(LearnerContext::new(profiles, graph)),
        },
        &config.agent,
    )?;

    let state = ApiState {
        service: Arc::new(service),
        scope: RunScope::new(config.thread_id.clone(), config.user_id.clone()),
    };
    let app = api_routes(state, &config.frontend_origin)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    tracing::info!(port = config.http_port, "HTTP server started");
    axum::serve(listener, app).await?;

    Ok(())
}
