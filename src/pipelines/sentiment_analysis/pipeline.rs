use super::model::SentimentAnalysisModel;
use crate::core::config::{MAX_TOKEN_LENGTH, NUM_LABELS};
use crate::core::ServiceError;
use crate::pipelines::utils::device_label;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::ops::softmax;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
}

impl Sentiment {
    /// Class 1 is positive; every other class is negative.
    pub fn from_label_index(index: usize) -> Self {
        if index == 1 {
            Sentiment::Positive
        } else {
            Sentiment::Negative
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub text: String,
    pub sentiment: Sentiment,
    /// Probability of the predicted class.
    pub confidence: f32,
    /// Seconds spent tokenizing, running and decoding this text.
    pub processing_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictionResult {
    pub results: Vec<PredictionResult>,
    /// Wall clock seconds of the whole batch call.
    pub total_processing_time: f64,
}

pub struct SentimentAnalysisPipeline<M: SentimentAnalysisModel> {
    pub(crate) model: M,
    pub(crate) tokenizer: Tokenizer,
}

impl<M: SentimentAnalysisModel> SentimentAnalysisPipeline<M> {
    /// Wraps a loaded model, configuring the tokenizer to truncate to
    /// [`MAX_TOKEN_LENGTH`] tokens and pad to the longest sequence.
    pub fn new(model: M, mut tokenizer: Tokenizer) -> anyhow::Result<Self> {
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKEN_LENGTH,
                ..Default::default()
            }))
            .map_err(anyhow::Error::msg)?;

        let padding = match tokenizer.get_padding() {
            Some(existing) => PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                ..existing.clone()
            },
            None => PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                pad_id: tokenizer.token_to_id("[PAD]").unwrap_or(0),
                pad_token: "[PAD]".to_string(),
                ..Default::default()
            },
        };
        tokenizer.with_padding(Some(padding));

        Ok(Self { model, tokenizer })
    }

    /// Classifies a single text. Any string is accepted, including the empty one.
    pub fn predict(&self, text: &str) -> Result<PredictionResult, ServiceError> {
        let start = Instant::now();
        let (label_index, confidence) = self.classify(text).map_err(ServiceError::prediction)?;
        let processing_time = start.elapsed().as_secs_f64();

        let sentiment = Sentiment::from_label_index(label_index);
        tracing::debug!(?sentiment, confidence, processing_time, "prediction");

        Ok(PredictionResult {
            text: text.to_string(),
            sentiment,
            confidence,
            processing_time,
        })
    }

    /// Classifies each text in order, one forward pass per text. The first
    /// failure aborts the whole batch.
    pub fn predict_batch(&self, texts: &[String]) -> Result<BatchPredictionResult, ServiceError> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(texts.len());

        for (index, text) in texts.iter().enumerate() {
            match self.predict(text) {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(index, batch_size = texts.len(), error = %e, "batch item failed");
                    return Err(ServiceError::Batch(Box::new(e)));
                }
            }
        }

        Ok(BatchPredictionResult {
            results,
            total_processing_time: start.elapsed().as_secs_f64(),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn device(&self) -> &Device {
        self.model.device()
    }

    pub fn device_label(&self) -> String {
        device_label(self.device())
    }

    fn classify(&self, text: &str) -> anyhow::Result<(usize, f32)> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization error: {e}"))?;
        if encoding.get_ids().is_empty() {
            anyhow::bail!("Tokenizer produced no tokens");
        }

        let device = self.model.device();
        let input_ids = Tensor::new(encoding.get_ids(), device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), device)?.unsqueeze(0)?;

        let logits = self.model.forward(&input_ids, &attention_mask)?;
        decode_logits(&logits)
    }
}

/// Softmax over one row of class scores, returning the argmax class and its
/// probability.
fn decode_logits(logits: &Tensor) -> anyhow::Result<(usize, f32)> {
    let (rows, classes) = logits.dims2()?;
    if rows != 1 || classes != NUM_LABELS {
        anyhow::bail!(
            "Expected logits of shape [1, {NUM_LABELS}], got {:?}",
            logits.dims()
        );
    }

    let probs = softmax(&logits.to_dtype(DType::F32)?, D::Minus1)?.squeeze(0)?;
    let label_index = probs.argmax(D::Minus1)?.to_scalar::<u32>()? as usize;
    let confidence = probs.to_vec1::<f32>()?[label_index];
    if !confidence.is_finite() {
        anyhow::bail!("Model produced non-finite scores");
    }

    Ok((label_index, confidence))
}
