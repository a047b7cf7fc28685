//! Sentiment analysis pipeline: the model service behind the HTTP API.
//!
//! The pipeline owns the tokenizer and the composed (base + adapter) model for
//! the lifetime of the process. Each call tokenizes one text, runs one forward
//! pass and turns the two class scores into a [`Sentiment`] with a confidence.
//!
//! ## Main Types
//!
//! - [`SentimentAnalysisPipeline`] - `predict` / `predict_batch`
//! - [`SentimentAnalysisPipelineBuilder`] - Loads the base checkpoint and adapter
//! - [`SentimentAnalysisModel`] - Trait for the classifier behind the pipeline
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use sentiment_lora::pipelines::sentiment_analysis::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let pipeline = SentimentAnalysisPipelineBuilder::new("distilbert-base-uncased", "./lora-sentiment")
//!     .build()
//!     .await?;
//!
//! let result = pipeline.predict("A wonderful, heartfelt film.")?;
//! println!("{:?} ({:.2})", result.sentiment, result.confidence);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod model;
pub mod pipeline;

pub use builder::SentimentAnalysisPipelineBuilder;
pub use model::SentimentAnalysisModel;
pub use pipeline::{BatchPredictionResult, PredictionResult, Sentiment, SentimentAnalysisPipeline};
