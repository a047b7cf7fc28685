use candle_core::{Device, Tensor};

/// A sequence classifier the pipeline can run.
///
/// Implementations are shared read-only across request handlers, hence the
/// `Send + Sync` bound.
pub trait SentimentAnalysisModel: Send + Sync {
    /// Raw class scores with shape `(batch_size, num_labels)` for token ids and
    /// attention mask of shape `(batch_size, sequence_length)`.
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor>;

    fn device(&self) -> &Device;
}
