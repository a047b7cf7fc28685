//! Application state management

use std::sync::Arc;

use crate::pipelines::sentiment_analysis::{SentimentAnalysisModel, SentimentAnalysisPipeline};

/// Application state shared across handlers. Built once after the model has
/// loaded and never mutated.
pub struct AppState<M: SentimentAnalysisModel> {
    pub pipeline: Arc<SentimentAnalysisPipeline<M>>,
    /// Device label computed at startup for the health endpoint.
    pub device: String,
}

impl<M: SentimentAnalysisModel> AppState<M> {
    pub fn new(pipeline: SentimentAnalysisPipeline<M>) -> Self {
        let device = pipeline.device_label();
        Self {
            pipeline: Arc::new(pipeline),
            device,
        }
    }
}
