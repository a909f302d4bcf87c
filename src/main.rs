//! AgriML inference API
//!
//! Serves the soil, plant disease and pest classifiers over HTTP. Models are
//! loaded once at startup; if any of them fails to load the server does not
//! start.

mod api;
mod inference;
mod model;
mod model_config;
mod preprocess;
mod registry;
mod response;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::model_config::ModelsConfig;
use crate::registry::ModelRegistry;

#[derive(Parser, Debug)]
#[command(name = "agriml-api")]
#[command(version)]
#[command(about = "HTTP API for soil, plant disease and pest image classification")]
struct Cli {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Directory holding the serialized models
    #[arg(long, env = "AGRIML_MODELS_DIR", default_value = "models")]
    models_dir: PathBuf,

    /// JSON file overriding model file names and output activations
    #[arg(long, env = "AGRIML_CONFIG")]
    config: Option<PathBuf>,

    /// Reject uploads larger than this many bytes (unlimited by default)
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    /// Minimum log level
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Serve fixed predictions instead of loading model artifacts
    #[arg(long)]
    placeholder: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(false)
        .compact()
        .init();

    info!("AgriML API v{}", env!("CARGO_PKG_VERSION"));

    let registry = if cli.placeholder {
        warn!("Running with placeholder models; predictions are fixed");
        let registry = ModelRegistry::placeholder();
        registry.log_input_shapes();
        registry
    } else {
        let config = match &cli.config {
            Some(path) => ModelsConfig::from_file(path, cli.models_dir.clone())?,
            None => ModelsConfig::with_models_dir(cli.models_dir.clone()),
        };
        info!("Models dir: {:?}", config.models_dir);
        ModelRegistry::load(&config).context("Failed to load models")?
    };

    let app = api::router(Arc::new(registry), cli.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
