//! API route definitions

use std::sync::Arc;

use axum::{
    http::Uri,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::{error::ServerError, handlers, state::AppState};
use crate::pipelines::sentiment_analysis::SentimentAnalysisModel;

async fn handle_404(uri: Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}

async fn handle_405() -> ServerError {
    ServerError::MethodNotAllowed
}

/// Create the main application router
pub fn create_router<M: SentimentAnalysisModel + 'static>(state: Arc<AppState<M>>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check::<M>))
        .route("/predict", post(handlers::predict::<M>))
        .route("/predict-batch", post(handlers::predict_batch::<M>))
        // Path advertised by the root endpoint
        .route("/predict_batch", post(handlers::predict_batch::<M>))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
