//! Request handlers

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{Result, ServerError};
use super::state::AppState;
use crate::pipelines::sentiment_analysis::{
    BatchPredictionResult, PredictionResult, SentimentAnalysisModel,
};

pub const SERVICE_NAME: &str = "Movie Review Sentiment Analysis API";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictionRequest {
    pub texts: Vec<String>,
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": SERVICE_NAME,
        "status": "active",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/predict": "Predict sentiment for a single review",
            "/predict_batch": "Predict sentiment for multiple reviews",
            "/health": "Check API health status",
        },
    }))
}

pub async fn health_check<M: SentimentAnalysisModel>(
    State(state): State<Arc<AppState<M>>>,
) -> Json<Value> {
    // AppState only exists once the model has loaded.
    Json(json!({
        "status": "healthy",
        "model_loaded": true,
        "device": state.device,
    }))
}

pub async fn predict<M: SentimentAnalysisModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    payload: std::result::Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>> {
    let Json(request) = payload.map_err(|e| ServerError::Unprocessable(e.body_text()))?;

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.predict(&request.text))
        .await
        .map_err(|e| ServerError::Internal(format!("inference task failed: {e}")))??;

    Ok(Json(result))
}

pub async fn predict_batch<M: SentimentAnalysisModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    payload: std::result::Result<Json<BatchPredictionRequest>, JsonRejection>,
) -> Result<Json<BatchPredictionResult>> {
    let Json(request) = payload.map_err(|e| ServerError::Unprocessable(e.body_text()))?;

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.predict_batch(&request.texts))
        .await
        .map_err(|e| ServerError::Internal(format!("inference task failed: {e}")))??;

    tracing::info!(
        texts = result.results.len(),
        total_processing_time = result.total_processing_time,
        "batch prediction"
    );
    Ok(Json(result))
}
