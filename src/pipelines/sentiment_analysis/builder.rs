use super::pipeline::SentimentAnalysisPipeline;
use crate::core::{ServiceConfig, ServiceError};
use crate::loaders::TokenizerLoader;
use crate::models::sentiment_distilbert::LoraDistilBertModel;
use crate::pipelines::utils::{device_label, DevicePreference, DeviceSelectable};
use std::path::PathBuf;
use std::time::Instant;

/// Builder for the sentiment pipeline.
///
/// Start with `new(base_model, adapter_path)` or `from_config(&ServiceConfig)`,
/// then optionally:
/// - `.revision(String)`: git revision (branch, tag, commit hash) of the base checkpoint.
/// - `.cpu()` / `.cuda_device(i)` / `.device(d)`: device selection.
///
/// `.build()` downloads (or reads from the hub cache) the base checkpoint and
/// tokenizer, merges the adapter overlay and returns the ready pipeline.
pub struct SentimentAnalysisPipelineBuilder {
    base_model: String,
    revision: String,
    adapter_path: PathBuf,
    device_preference: DevicePreference,
}

impl SentimentAnalysisPipelineBuilder {
    pub fn new(base_model: impl Into<String>, adapter_path: impl Into<PathBuf>) -> Self {
        Self {
            base_model: base_model.into(),
            revision: "main".to_string(),
            adapter_path: adapter_path.into(),
            device_preference: DevicePreference::Auto,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        let builder = Self::new(config.base_model.clone(), config.adapter_path.clone())
            .revision(config.revision.clone());
        if config.cpu {
            builder.cpu()
        } else {
            builder
        }
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Loads everything the pipeline needs. Failures are fatal
    /// [`ServiceError::Load`] errors.
    pub async fn build(self) -> Result<SentimentAnalysisPipeline<LoraDistilBertModel>, ServiceError> {
        let start = Instant::now();
        let pipeline = self.load().await.map_err(ServiceError::load)?;
        tracing::info!(
            device = %pipeline.device_label(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "model loaded"
        );
        Ok(pipeline)
    }

    async fn load(self) -> anyhow::Result<SentimentAnalysisPipeline<LoraDistilBertModel>> {
        let device = self.device_preference.resolve()?;
        tracing::info!(
            base_model = %self.base_model,
            revision = %self.revision,
            adapter = ?self.adapter_path,
            device = %device_label(&device),
            "loading model"
        );

        let tokenizer = TokenizerLoader::new(&self.base_model, &self.revision)
            .load()
            .await?;
        let model =
            LoraDistilBertModel::load(&self.base_model, &self.revision, &self.adapter_path, device)
                .await?;

        SentimentAnalysisPipeline::new(model, tokenizer)
    }
}

impl DeviceSelectable for SentimentAnalysisPipelineBuilder {
    fn device_preference_mut(&mut self) -> &mut DevicePreference {
        &mut self.device_preference
    }
}
