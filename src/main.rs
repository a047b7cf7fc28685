//! Sentiment classification service binary.
//!
//! Loads the base checkpoint and adapter overlay, then serves the HTTP API.
//! If the model cannot be loaded the process exits before binding the port.

use clap::Parser;
use sentiment_lora::server::run_server;
use sentiment_lora::{SentimentAnalysisPipelineBuilder, ServiceConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = ServiceConfig::parse();
    info!(?config, "Sentiment service starting up");

    let pipeline = match SentimentAnalysisPipelineBuilder::from_config(&config).build().await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Model initialization failed, refusing to serve");
            return Err(e.into());
        }
    };

    run_server(&config, pipeline).await
}
