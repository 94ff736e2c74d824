//! Schema Drift Agent entry point
//!
//! Snapshot lineage, deterministic drift classification and policy-driven
//! pipeline decisions.

use clap::{Parser, Subcommand};
use schema_drift::catalog::{InMemoryCatalog, PipelineCatalog};
use schema_drift::config::{LogFormat, ServiceConfig, StoreBackend};
use schema_drift::contracts::*;
use schema_drift::engine::{DriftEngine, Ruleset, TransformationIndex, DEFAULT_RULESET};
use schema_drift::handler::{create_router, AppState, AGENT_ID, AGENT_VERSION};
use schema_drift::lineage::{CanonicalPayload, LineageStore, SledGraph};
use schema_drift::orchestrator::DriftOrchestrator;
use schema_drift::ports::{ConnectorRegistry, LogNotifier, PayloadFileConnector, QueueingHealer};
use schema_drift::telemetry::{init_tracing, DriftMetrics};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "schema-drift")]
#[command(about = "Schema Drift Agent - detect, classify and triage schema drift")]
#[command(version)]
struct Cli {
    /// Log format (json or text)
    #[arg(long, global = true, env = "DRIFT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "DRIFT_PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "DRIFT_HOST")]
        host: Option<String>,

        /// Pipeline catalog (YAML/JSON/TOML)
        #[arg(short, long, env = "DRIFT_CATALOG")]
        catalog: Option<PathBuf>,
    },

    /// Run one detection for a pipeline
    Detect {
        /// Pipeline id
        #[arg(short, long)]
        pipeline: String,

        /// Pipeline catalog (YAML/JSON/TOML)
        #[arg(short, long, env = "DRIFT_CATALOG")]
        catalog: PathBuf,

        /// Persistent store directory (in-memory when omitted)
        #[arg(short, long, env = "DRIFT_STORE_PATH")]
        store: Option<PathBuf>,
    },

    /// Diff two canonical payload files of the same component
    Diff {
        /// Earlier payload
        #[arg(long)]
        previous: PathBuf,

        /// Later payload
        #[arg(long)]
        current: PathBuf,

        /// Built-in ruleset (default or strict)
        #[arg(short, long, default_value = DEFAULT_RULESET)]
        ruleset: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env()?;
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    init_tracing(config.log_format)?;

    match cli.command {
        Commands::Serve { port, host, catalog } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(host) = host {
                config.host = host;
            }
            if catalog.is_some() {
                config.catalog_path = catalog;
            }

            let addr: SocketAddr = config.bind_address().parse()?;
            let metrics = Arc::new(DriftMetrics::new()?);
            let orchestrator = build_orchestrator(&config, Arc::clone(&metrics))?;
            let router = create_router(Arc::new(AppState::new(Arc::new(orchestrator), metrics)));

            tracing::info!("Starting Schema Drift Agent on {}", addr);
            tracing::info!("Agent ID: {}, Version: {}", AGENT_ID, AGENT_VERSION);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await?;
        }

        Commands::Detect {
            pipeline,
            catalog,
            store,
        } => {
            config.catalog_path = Some(catalog);
            if let Some(path) = store {
                config.store = StoreBackend::Sled { path };
            }

            let metrics = Arc::new(DriftMetrics::new()?);
            let orchestrator = build_orchestrator(&config, metrics)?;
            let response = orchestrator
                .detect_drift(DetectDriftRequest::new(pipeline))
                .await?;

            println!("{}", serde_json::to_string_pretty(&response)?);
            eprintln!("{}", response.summary());
            std::process::exit(exit_code(response.decision));
        }

        Commands::Diff {
            previous,
            current,
            ruleset,
        } => {
            let ruleset = Ruleset::builtin(&ruleset)
                .ok_or_else(|| anyhow::anyhow!("unknown ruleset '{}'", ruleset))?;
            let previous = CanonicalPayload::from_path(&previous)?;
            let current = CanonicalPayload::from_path(&current)?;

            let store = LineageStore::in_memory();
            let before = store.record_snapshot(&previous.component(), previous.fields.clone())?;
            let after = store.record_snapshot(&current.component(), current.fields.clone())?;

            let report = DriftEngine::new().detect(
                &after,
                Some(&before),
                &TransformationIndex::default(),
                &ruleset,
            )?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            eprintln!("{}", report.summary);
            if report.breaking {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

fn build_orchestrator(config: &ServiceConfig, metrics: Arc<DriftMetrics>) -> anyhow::Result<DriftOrchestrator> {
    let catalog: Arc<dyn PipelineCatalog> = match &config.catalog_path {
        Some(path) => Arc::new(InMemoryCatalog::load(path)?),
        None => {
            tracing::warn!("No catalog configured, every pipeline lookup will fail");
            Arc::new(InMemoryCatalog::new())
        }
    };

    let lineage = match &config.store {
        StoreBackend::Memory => LineageStore::in_memory(),
        StoreBackend::Sled { path } => {
            tracing::info!(path = %path.display(), "Opening sled metadata graph");
            LineageStore::new(Arc::new(SledGraph::open(path)?))
        }
    }
    .with_metrics(Arc::clone(&metrics));

    let connectors = ConnectorRegistry::new().with_connector(PayloadFileConnector);

    Ok(DriftOrchestrator::new(catalog, lineage, connectors)
        .with_notifier(Arc::new(LogNotifier))
        .with_healer(Arc::new(QueueingHealer::new()))
        .with_metrics(metrics)
        .with_timeout(config.collaborator_timeout())
        .with_replay_capacity(config.replay_capacity))
}

/// Non-zero when a human has to look at the pipeline
fn exit_code(decision: Decision) -> i32 {
    match decision {
        Decision::Continue | Decision::AutoHeal => 0,
        Decision::ManualReview => 2,
        Decision::Pause => 3,
    }
}
