//! Ember application binary - composition root.
//!
//! 1. Load configuration from TOML
//! 2. Build the knowledge index with the configured embedding backend
//! 3. Validate the restaurant conversation graph
//! 4. Run either the interactive prompt loop or the JSON-lines turn loop

mod cli;
mod prompts;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use ember_core::config::{EmberConfig, RetrievalConfig};
use ember_core::SessionContext;
use ember_dialog::{
    CompletionSink, ConversationGraph, DialogueOrchestrator, FallbackPolicy, JsonLinesSink,
    TracingSink, TurnRequest,
};
use ember_vector::{
    DynEmbeddingService, KnowledgeIndex, KnowledgeSeed, OnnxEmbeddingService, RetrievalEngine,
    TermHashEmbedding,
};

use cli::{expand_home, CliArgs};

/// Pick the embedding backend and the threshold that goes with it. A
/// missing or broken ONNX model falls back to the term-hash backend.
fn select_embedder(config: &RetrievalConfig) -> (Box<dyn DynEmbeddingService>, f64) {
    match config.embedding_backend.as_str() {
        "onnx" => {
            let model_dir = expand_home(&config.model_dir);
            match OnnxEmbeddingService::from_directory(&model_dir) {
                Ok(service) => {
                    tracing::info!(path = %model_dir.display(), "ONNX embedding model loaded");
                    return (Box::new(service), config.confidence_threshold);
                }
                Err(e) => tracing::warn!(
                    error = %e,
                    threshold = config.term_hash_threshold,
                    "ONNX embedding unavailable, falling back to term-hash embedding"
                ),
            }
        }
        "term-hash" => {
            tracing::info!(threshold = config.term_hash_threshold, "Using term-hash embedding")
        }
        other => tracing::warn!(
            backend = other,
            "Unknown embedding backend, using term-hash embedding"
        ),
    }
    (
        Box::new(TermHashEmbedding::new(config.embedding_dim)),
        config.term_hash_threshold,
    )
}

/// Prompt loop on stdin/stdout until the conversation ends or input closes.
async fn run_interactive(
    orchestrator: &DialogueOrchestrator,
) -> Result<(), Box<dyn std::error::Error>> {
    let graph = orchestrator.graph();
    let mut state = graph.initial().clone();
    let mut context = SessionContext::new();
    println!("{}", prompts::render(graph.template_of(state.as_str())?, &context));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match orchestrator
            .advance(state.as_str(), line.trim(), context.clone())
            .await
        {
            Ok(turn) => {
                state = turn.next_state;
                context = turn.context;
            }
            Err(e) => {
                tracing::warn!(state = %state, error = %e, "Turn failed");
                println!("{}", prompts::RETRIEVAL_UNAVAILABLE);
                continue;
            }
        }

        println!("\n{}", prompts::render(graph.template_of(state.as_str())?, &context));
        if graph.state(state.as_str()).is_some_and(|s| s.is_terminal()) {
            break;
        }
    }
    Ok(())
}

/// One `TurnRequest` per stdin line in, one turn (or error object) per
/// stdout line out.
async fn run_json(orchestrator: &DialogueOrchestrator) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<TurnRequest>(&line) {
            Ok(request) => match orchestrator.handle(request).await {
                Ok(turn) => serde_json::to_value(&turn)?,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            },
            Err(e) => serde_json::json!({ "error": format!("invalid request: {e}") }),
        };
        let mut out = serde_json::to_string(&reply)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing so the configured level can apply.
    let config_file = args.resolve_config_path();
    let config_found = config_file.exists();
    let config = if config_found {
        EmberConfig::load(&config_file)?
    } else {
        EmberConfig::default()
    };

    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Ember v{}", env!("CARGO_PKG_VERSION"));
    if config_found {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
    }

    // Knowledge index.
    let seeds = match args.resolve_knowledge_base(config.retrieval.knowledge_base.as_deref()) {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading knowledge base");
            KnowledgeSeed::load_json(&path)?
        }
        None => KnowledgeSeed::bundled()?,
    };
    let (embedder, threshold) = select_embedder(&config.retrieval);
    let index = KnowledgeIndex::build(seeds, embedder.as_ref()).await?;
    let retrieval = RetrievalEngine::new_dyn(Arc::new(index), embedder, threshold)
    .with_timeout(Duration::from_millis(config.retrieval.encode_timeout_ms));

    // Conversation graph.
    let graph = ConversationGraph::restaurant()?;
    tracing::info!(states = graph.len(), initial = %graph.initial(), "Conversation graph ready");

    // Completion events.
    let sink: Arc<dyn CompletionSink> =
        if config.completion_log.enabled || args.completion_log.is_some() {
            let path = args.resolve_completion_log(&config.completion_log.path);
            tracing::info!(path = %path.display(), "Completion events logged to file");
            Arc::new(JsonLinesSink::new(path))
        } else {
            Arc::new(TracingSink)
        };

    let policy: FallbackPolicy = config.dialog.fallback_policy.parse()?;
    let orchestrator = DialogueOrchestrator::new(Arc::new(graph), Arc::new(retrieval), sink)
        .with_policy(policy)
        .with_summary_limit(config.completion_log.summary_max_chars)
        .with_sink_timeout(Duration::from_millis(config.completion_log.sink_timeout_ms));

    if args.json {
        run_json(&orchestrator).await
    } else {
        run_interactive(&orchestrator).await
    }
}
