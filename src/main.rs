use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docindex::{
    api,
    config::{self, Config},
    embedding::HttpEmbeddingClient,
    index, logging,
    objects::FsObjectStore,
    processing::IngestionService,
    retrieval::RetrievalService,
    scheduler::Scheduler,
    state::ProcessingState,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "docindex")]
#[command(version, about = "Namespaced document ingestion and semantic retrieval", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API, running scheduled ingestion when enabled
    Serve,
    /// Ingest every configured namespace, or a single document, and print the result as JSON
    Ingest {
        /// Namespace of a single document to process
        #[arg(long, requires = "name")]
        namespace: Option<String>,
        /// Name of a single document to process
        #[arg(long, requires = "namespace")]
        name: Option<String>,
    },
    /// Search indexed documents and print the results as JSON
    Search {
        /// Query text
        query: String,
        /// Maximum number of results (defaults to SEARCH_DEFAULT_TOP_K)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Restrict results to one namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

struct Engine {
    ingestion: Arc<IngestionService>,
    retrieval: Arc<RetrievalService>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();
    let engine = build_engine(config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, engine).await,
        Command::Ingest { namespace, name } => {
            let output = match (namespace, name) {
                (Some(namespace), Some(name)) => {
                    let processed = engine
                        .ingestion
                        .process_document(&namespace, &name)
                        .await
                        .with_context(|| format!("Failed to process {namespace}/{name}"))?;
                    serde_json::to_string_pretty(&processed)?
                }
                _ => serde_json::to_string_pretty(&engine.ingestion.process_all().await)?,
            };
            println!("{output}");
            Ok(())
        }
        Command::Search {
            query,
            top_k,
            namespace,
        } => {
            let top_k = top_k.unwrap_or(config.search_default_top_k);
            let results = engine
                .retrieval
                .search(&query, top_k, namespace.as_deref())
                .await;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
    }
}

async fn build_engine(config: &Config) -> Result<Engine> {
    tracing::info!("Initializing embedding client");
    let embedder = Arc::new(
        HttpEmbeddingClient::new(&config.embedding_settings())
            .context("Failed to build embedding client")?,
    );
    let index = index::connect_index(
        config.vector_backend,
        config.qdrant_settings(),
        config.embedding_dimension,
    )
    .await;
    let store = Arc::new(FsObjectStore::new(config.documents_root.clone()));
    let state = Arc::new(ProcessingState::new(config.recent_documents_capacity));

    let ingestion = Arc::new(IngestionService::new(
        store,
        embedder.clone(),
        index.clone(),
        state,
        config.ingestion_settings(),
    ));
    let retrieval = Arc::new(RetrievalService::new(
        embedder,
        index,
        config.retrieval_settings(),
    ));

    Ok(Engine {
        ingestion,
        retrieval,
    })
}

async fn serve(config: &Config, engine: Engine) -> Result<()> {
    let scheduler = if config.auto_processing_enabled {
        Some(Scheduler::start(
            engine.ingestion.clone(),
            &config.ingest_schedule,
        )?)
    } else {
        tracing::info!("Automatic ingestion disabled");
        None
    };

    let app = api::create_router(
        engine.ingestion,
        engine.retrieval,
        config.search_default_top_k,
    );
    let (listener, port) = bind_listener(config)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(handle) = scheduler {
        handle.stop().await;
    }
    Ok(())
}

async fn bind_listener(config: &Config) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
