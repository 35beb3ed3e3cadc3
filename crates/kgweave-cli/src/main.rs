//! kgweave - build knowledge graphs for a directory of documents.
//!
//! ```text
//! kgweave [CONFIG] [--input DIR] [--output DIR] [--concurrency N]
//! ```
//!
//! Without a config file, settings come from `KGWEAVE_*` environment
//! variables (a `.env` file is honoured). Documents whose graph already
//! exists in the output directory are skipped, so an interrupted run is
//! resumed by running the same command again.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kgweave_core::{
    BatchReport, BatchRunner, DocumentPipeline, DocumentSource, ExtractionGateway, GraphBuilder,
    JsonDirectorySource, JsonFileSink, KgConfig, LlmStructuredExtractor,
};
use kgweave_embeddings::EmbedderFactory;
use kgweave_llm::LlmFactory;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const REPORT_FILE: &str = ".kgweave-report.json";

/// Build knowledge graphs for every document in a directory.
#[derive(Debug, Default, Parser)]
#[command(name = "kgweave")]
#[command(about = "Build knowledge graphs for a directory of documents", long_about = None)]
#[command(version)]
struct Args {
    /// TOML or YAML config file; `KGWEAVE_*` variables are used without one
    config: Option<PathBuf>,

    /// Directory of `<id>.json` documents
    #[arg(long = "input", value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Directory receiving one graph per document
    #[arg(long = "output", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Documents processed at once
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,
}

fn load_config(args: &Args) -> Result<KgConfig> {
    let mut config = match &args.config {
        Some(path) => KgConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => KgConfig::from_env(),
    };
    if let Some(dir) = &args.input_dir {
        config.input_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(n) = args.concurrency {
        config.batch.concurrency = n;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: KgConfig) -> Result<BatchReport> {
    let llm = LlmFactory::from_config(&config.llm)?;
    let embedder = EmbedderFactory::from_config(&config.embedder)?;
    info!(
        llm = llm.model_name(),
        embedder = embedder.model_name(),
        "Providers ready"
    );

    let extractor = Arc::new(LlmStructuredExtractor::new(llm));
    let gateway = ExtractionGateway::new(extractor, embedder, config.extraction.clone());
    let builder = Arc::new(GraphBuilder::new(gateway, config.build.clone()));

    let source = Arc::new(JsonDirectorySource::new(&config.input_dir));
    let sink = Arc::new(JsonFileSink::new(&config.output_dir));
    let pipeline = Arc::new(DocumentPipeline::new(source.clone(), builder, sink.clone()));

    let ids = source
        .list_ids()
        .await
        .with_context(|| format!("failed to list {}", config.input_dir.display()))?;
    info!(
        documents = ids.len(),
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        "Starting batch"
    );

    let report = BatchRunner::new(config.batch.clone())
        .run(ids, sink.as_ref(), pipeline)
        .await?;

    let report_path = config.output_dir.join(REPORT_FILE);
    tokio::fs::create_dir_all(&config.output_dir).await?;
    tokio::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)
        .await
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("kgweave_core=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let report = run(config).await?;
    println!("{}", report.summary());

    if !report.is_success() {
        warn!(failed = report.failed.len(), "Some documents failed; rerun to retry them");
        std::process::exit(1);
    }
    Ok(())
}
