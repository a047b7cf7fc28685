//! HTTP facade over the sentiment pipeline.
//!
//! Routes: `GET /`, `GET /health`, `POST /predict`, `POST /predict-batch`.
//! Errors are translated to status codes here and nowhere else; every error
//! body has the shape `{"detail": "..."}`.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use handlers::{BatchPredictionRequest, PredictionRequest, SERVICE_NAME};
pub use state::AppState;

use std::sync::Arc;
use tracing::{info, warn};

use crate::core::ServiceConfig;
use crate::pipelines::sentiment_analysis::{SentimentAnalysisModel, SentimentAnalysisPipeline};

/// Serve `pipeline` until Ctrl+C.
pub async fn run_server<M: SentimentAnalysisModel + 'static>(
    config: &ServiceConfig,
    pipeline: SentimentAnalysisPipeline<M>,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(pipeline));
    let app = create_router(Arc::clone(&state));

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        device = %state.device,
        pid = std::process::id(),
        "Server listening and ready to accept connections"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server stopped");
    Ok(())
}
