use thiserror::Error;

/// Errors surfaced by the sentiment service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The tokenizer, base checkpoint or adapter overlay could not be loaded.
    /// Fatal: the process must not start serving.
    #[error("Failed to load model: {0}")]
    Load(String),

    /// Tokenization or the forward pass failed for a single input.
    #[error("Error predicting sentiment: {0}")]
    Prediction(String),

    /// One item of a batch failed, aborting the whole batch.
    #[error("Error predicting batch sentiment: {0}")]
    Batch(Box<ServiceError>),
}

impl ServiceError {
    pub(crate) fn load(err: anyhow::Error) -> Self {
        Self::Load(format!("{err:#}"))
    }

    pub(crate) fn prediction(err: anyhow::Error) -> Self {
        Self::Prediction(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_error_keeps_item_message() {
        let item = ServiceError::prediction(anyhow::anyhow!("shape mismatch"));
        let batch = ServiceError::Batch(Box::new(item));
        assert_eq!(
            batch.to_string(),
            "Error predicting batch sentiment: Error predicting sentiment: shape mismatch"
        );
    }

    #[test]
    fn load_error_includes_context_chain() {
        let err = anyhow::anyhow!("file not found").context("reading adapter_config.json");
        let msg = ServiceError::load(err).to_string();
        assert!(msg.starts_with("Failed to load model: reading adapter_config.json"));
        assert!(msg.contains("file not found"));
    }
}
