pub mod core;
pub mod loaders;
pub mod models;
pub mod pipelines;
pub mod server;

// Re-export core types
pub use crate::core::{ServiceConfig, ServiceError};

pub use pipelines::sentiment_analysis::{
    BatchPredictionResult, PredictionResult, Sentiment, SentimentAnalysisModel,
    SentimentAnalysisPipeline, SentimentAnalysisPipelineBuilder,
};
