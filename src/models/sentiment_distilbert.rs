//! DistilBERT sentiment classifier composed from a hub base checkpoint and a
//! local LoRA adapter overlay.

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use std::collections::HashMap;
use std::path::Path;

use super::distilbert::{
    canonical_tensor_name, init_missing_head, Config, DistilBertForSequenceClassification,
};
use super::lora::LoraAdapter;
use crate::core::config::NUM_LABELS;
use crate::loaders::{ModelConfigLoader, WeightsLoader};
use crate::pipelines::sentiment_analysis::SentimentAnalysisModel;

/// Base checkpoint with the adapter merged into its weights.
#[derive(Debug, Clone)]
pub struct LoraDistilBertModel {
    model: DistilBertForSequenceClassification,
    device: Device,
}

impl LoraDistilBertModel {
    pub async fn load(
        base_model: &str,
        revision: &str,
        adapter_path: &Path,
        device: Device,
    ) -> anyhow::Result<Self> {
        let adapter = LoraAdapter::load(adapter_path, &device)
            .with_context(|| format!("loading adapter from {adapter_path:?}"))?;
        if let Some(adapter_base) = &adapter.config.base_model_name_or_path {
            if adapter_base != base_model {
                tracing::warn!(
                    adapter_base = %adapter_base,
                    base_model,
                    "adapter was trained against a different base checkpoint"
                );
            }
        }

        let config: Config = ModelConfigLoader::new(base_model, revision)
            .load()
            .await
            .with_context(|| format!("loading config of {base_model}"))?;

        let mut weights: HashMap<String, Tensor> = WeightsLoader::new(base_model, revision)
            .load(&device)
            .await
            .with_context(|| format!("loading weights of {base_model}"))?
            .into_iter()
            .map(|(name, tensor)| (canonical_tensor_name(&name), tensor))
            .collect();
        tracing::info!(base_model, tensors = weights.len(), "base checkpoint loaded");

        Self::from_weights(&config, weights, &adapter, device)
    }

    /// Merges `adapter` into `weights` and builds the classifier.
    pub fn from_weights(
        config: &Config,
        mut weights: HashMap<String, Tensor>,
        adapter: &LoraAdapter,
        device: Device,
    ) -> anyhow::Result<Self> {
        let report = adapter.merge_into(&mut weights)?;
        tracing::info!(
            adapter = ?adapter.path,
            rank = adapter.config.r,
            scaling = adapter.config.scaling(),
            merged = report.merged_modules.len(),
            replaced = report.replaced_tensors.len(),
            "adapter merged"
        );

        let seeded = init_missing_head(&mut weights, config, NUM_LABELS, &device)?;
        if !seeded.is_empty() {
            tracing::warn!(
                tensors = ?seeded,
                "classification head not found in checkpoint or adapter, using seeded initialization"
            );
        }

        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = DistilBertForSequenceClassification::load(vb, config, NUM_LABELS)?;
        Ok(Self { model, device })
    }
}

impl SentimentAnalysisModel for LoraDistilBertModel {
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
        Ok(self.model.forward(input_ids, attention_mask)?)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
