use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod settings;

use application::services::{CompletionEngine, EmbeddingEngine, RecordStore};
use application::{QueryRequest, QueryService};
use domain::RecordSnapshot;
#[cfg(feature = "fastembed-engine")]
use infrastructure::FastEmbedEngine;
use infrastructure::{
    GeminiCompletionClient, RemoteEmbeddingEngine, SimpleEmbedEngine, SledRecordStore,
};
use settings::{AppConfig, ConfigManager, EmbeddingBackend};

/// Everything a caller needs after bootstrap.
pub struct AppHandles {
    pub service: Arc<QueryService>,
    pub store: Arc<SledRecordStore>,
    pub config: Arc<ConfigManager>,
}

/// Question answering over the local financial ledger.
#[derive(Debug, Parser)]
#[command(name = "finrag", version, rename_all = "kebab")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Answer a question and print the response as JSON.
    Ask {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, value_name = "QUESTION")]
        question: Vec<String>,
    },
    /// Load a JSON record snapshot into the store.
    Import {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Check that the record store is reachable.
    Health,
    /// Print the effective configuration, writing defaults when missing.
    Config,
}

/// Entry point invoked from `main.rs`.
pub fn run() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(err) = execute(cli.command) {
        eprintln!("[finrag] {err:?}");
        std::process::exit(1);
    }
}

fn execute(command: Command) -> Result<()> {
    let handles = build_environment().context("failed to bootstrap finrag environment")?;

    match command {
        Command::Ask { question } => {
            let question = question.join(" ");
            let response = handles.service.ask(QueryRequest { question });
            print_json(&response)
        }
        Command::Import { path } => {
            let summary = import_snapshot_file(&handles.store, &path)?;
            print_json(&summary)
        }
        Command::Health => {
            let status = handles
                .service
                .health()
                .map_err(|err| anyhow!(err))
                .context("record store is not reachable")?;
            print_json(&status)
        }
        Command::Config => {
            if !handles.config.path().exists() {
                handles
                    .config
                    .persist()
                    .context("failed to write default config file")?;
            }
            print_json(&handles.config.current())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

/// Reads a JSON [`RecordSnapshot`] and upserts it into the store.
pub fn import_snapshot_file(
    store: &SledRecordStore,
    path: &Path,
) -> Result<infrastructure::ImportSummary> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot: RecordSnapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid snapshot {}", path.display()))?;
    store
        .import_snapshot(&snapshot)
        .map_err(|err| anyhow!(err))
        .context("failed to import snapshot")
}

fn init_tracing() {
    init_tracing_with_writer(std::io::stderr);
}

fn init_tracing_with_writer<W>(make_writer: fn() -> W)
where
    W: std::io::Write + Send + Sync + 'static,
{
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var("FINRAG_LOG").unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(make_writer)
            .compact()
            .try_init();
    });
}

/// Opens the store under the resolved data directory and wires the service
/// from the persisted configuration.
pub fn build_environment() -> Result<AppHandles> {
    let data_dir = resolve_data_dir()?;
    build_environment_at(&data_dir)
}

pub fn build_environment_at(data_dir: &Path) -> Result<AppHandles> {
    let config = Arc::new(ConfigManager::load(data_dir).context("failed to load config file")?);
    let active_config = config.current();

    let store = Arc::new(
        SledRecordStore::open(data_dir.join("store"))
            .map_err(|err| anyhow!(err))
            .context("failed to open embedded store")?,
    );

    let embedder = init_embedder(&active_config.embedding)
        .context("failed to initialise embedding backend")?;
    let completion = init_completion(&active_config);

    let record_store: Arc<dyn RecordStore> = store.clone();
    let service = Arc::new(QueryService::new(
        record_store,
        embedder,
        completion,
        active_config.service_config(),
        active_config.generation.policy(),
    ));

    info!(
        target: "finrag::query",
        data_dir = %data_dir.display(),
        backend = active_config.embedding.id(),
        "environment ready"
    );

    Ok(AppHandles {
        service,
        store,
        config,
    })
}

fn init_embedder(backend: &EmbeddingBackend) -> Result<Arc<dyn EmbeddingEngine>> {
    match backend {
        EmbeddingBackend::Simple { model, dimensions } => {
            let engine = SimpleEmbedEngine::try_new(model.clone(), *dimensions)
                .map_err(|err| anyhow!(err))?;
            Ok(Arc::new(engine))
        }
        EmbeddingBackend::Remote {
            api_base,
            path,
            timeout_ms,
            ..
        } => {
            let api_key = std::env::var("FINRAG_EMBEDDING_API_KEY").ok();
            Ok(Arc::new(RemoteEmbeddingEngine::new(
                api_base,
                path,
                api_key,
                std::time::Duration::from_millis(*timeout_ms),
            )))
        }
        #[cfg(feature = "fastembed-engine")]
        EmbeddingBackend::FastEmbed { model } => {
            let engine = FastEmbedEngine::try_new(model).map_err(|err| anyhow!(err))?;
            Ok(Arc::new(engine))
        }
    }
}

/// A missing key is not fatal: every call then fails and answers fall back
/// to the extractive summary.
fn init_completion(config: &AppConfig) -> Arc<dyn CompletionEngine> {
    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        tracing::warn!(
            target: "finrag::generation",
            "GEMINI_API_KEY is not set; answers will use the extractive fallback"
        );
    }
    Arc::new(GeminiCompletionClient::new(
        config.generation.api_base.clone(),
        api_key,
        config.generation.timeout(),
    ))
}

fn resolve_data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("FINRAG_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => directories::ProjectDirs::from("dev", "finrag", "Finrag")
            .ok_or_else(|| anyhow!("unable to determine OS data dir"))?
            .data_dir()
            .to_path_buf(),
    };
    std::fs::create_dir_all(&dir).context("failed to create data directory")?;
    Ok(dir)
}
