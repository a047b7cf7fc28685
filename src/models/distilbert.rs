//! DistilBERT encoder with a sequence-classification head.
//!
//! DistilBERT is a six layer distillation of BERT: learned absolute position
//! embeddings, post-norm transformer blocks and no token-type embeddings.
//! The classification head pools the first (`[CLS]`) token:
//! `pre_classifier -> ReLU -> classifier`.
//!
//! Tensor names follow the Hugging Face checkpoint layout:
//!
//! ```text
//! distilbert.embeddings.{word_embeddings,position_embeddings,LayerNorm}
//! distilbert.transformer.layer.{i}.attention.{q_lin,k_lin,v_lin,out_lin}
//! distilbert.transformer.layer.{i}.{sa_layer_norm,ffn.lin1,ffn.lin2,output_layer_norm}
//! pre_classifier
//! classifier
//! ```

use candle_core::{DType, Device, IndexOp, Result, Tensor, D};
use candle_nn::{
    embedding, layer_norm, linear, ops::softmax_last_dim, Activation, Embedding, LayerNorm,
    Linear, Module, VarBuilder,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;

const LAYER_NORM_EPS: f64 = 1e-12;
const MIN_VALUE_F64: f64 = f32::MIN as f64;
const HEAD_INIT_SEED: u64 = 42;

/// Prefix of the encoder tensors inside a checkpoint.
pub const ENCODER_PREFIX: &str = "distilbert";

fn default_activation() -> Activation {
    Activation::Gelu
}

fn default_initializer_range() -> f64 {
    0.02
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub vocab_size: usize,
    pub dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub hidden_dim: usize,
    pub max_position_embeddings: usize,
    #[serde(default = "default_activation")]
    pub activation: Activation,
    #[serde(default = "default_initializer_range")]
    pub initializer_range: f64,
    #[serde(default)]
    pub pad_token_id: u32,
}

impl Config {
    /// Shapes of the classification head tensors for `num_labels` classes.
    pub fn head_shapes(&self, num_labels: usize) -> [(String, Vec<usize>); 4] {
        [
            ("pre_classifier.weight".into(), vec![self.dim, self.dim]),
            ("pre_classifier.bias".into(), vec![self.dim]),
            ("classifier.weight".into(), vec![num_labels, self.dim]),
            ("classifier.bias".into(), vec![num_labels]),
        ]
    }
}

#[derive(Debug, Clone)]
struct Embeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    layer_norm: LayerNorm,
}

impl Embeddings {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let word_embeddings = embedding(config.vocab_size, config.dim, vb.pp("word_embeddings"))?;
        let position_embeddings = embedding(
            config.max_position_embeddings,
            config.dim,
            vb.pp("position_embeddings"),
        )?;
        let layer_norm = layer_norm(config.dim, LAYER_NORM_EPS, vb.pp("LayerNorm"))?;
        Ok(Self {
            word_embeddings,
            position_embeddings,
            layer_norm,
        })
    }
}

impl Module for Embeddings {
    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (_batch, seq_len) = input_ids.dims2()?;
        let position_ids = Tensor::arange(0u32, seq_len as u32, input_ids.device())?;
        let input_embeds = input_ids.apply(&self.word_embeddings)?;
        let position_embeds = position_ids.apply(&self.position_embeddings)?;
        input_embeds
            .broadcast_add(&position_embeds)?
            .apply(&self.layer_norm)
    }
}

#[derive(Debug, Clone)]
struct MultiHeadSelfAttention {
    q_lin: Linear,
    k_lin: Linear,
    v_lin: Linear,
    out_lin: Linear,
    n_heads: usize,
    dim_per_head: usize,
}

impl MultiHeadSelfAttention {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        if config.dim % config.n_heads != 0 {
            candle_core::bail!(
                "hidden size {} is not divisible by the number of heads {}",
                config.dim,
                config.n_heads
            );
        }
        Ok(Self {
            q_lin: linear(config.dim, config.dim, vb.pp("q_lin"))?,
            k_lin: linear(config.dim, config.dim, vb.pp("k_lin"))?,
            v_lin: linear(config.dim, config.dim, vb.pp("v_lin"))?,
            out_lin: linear(config.dim, config.dim, vb.pp("out_lin"))?,
            n_heads: config.n_heads,
            dim_per_head: config.dim / config.n_heads,
        })
    }

    fn split_heads(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = xs.dims3()?;
        xs.reshape((batch, seq_len, self.n_heads, self.dim_per_head))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, dim) = hidden_states.dims3()?;

        let q = self.split_heads(&hidden_states.apply(&self.q_lin)?)?;
        let k = self.split_heads(&hidden_states.apply(&self.k_lin)?)?;
        let v = self.split_heads(&hidden_states.apply(&self.v_lin)?)?;

        let scale = (self.dim_per_head as f64).powf(-0.5);
        let q = (q * scale)?;

        let scores = q
            .matmul(&k.transpose(D::Minus2, D::Minus1)?.contiguous()?)?
            .broadcast_add(attention_mask)?;
        let weights = softmax_last_dim(&scores)?;

        weights
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, dim))?
            .apply(&self.out_lin)
    }
}

#[derive(Debug, Clone)]
struct FeedForward {
    lin1: Linear,
    lin2: Linear,
    activation: Activation,
}

impl FeedForward {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        Ok(Self {
            lin1: linear(config.dim, config.hidden_dim, vb.pp("lin1"))?,
            lin2: linear(config.hidden_dim, config.dim, vb.pp("lin2"))?,
            activation: config.activation,
        })
    }
}

impl Module for FeedForward {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        xs.apply(&self.lin1)?
            .apply(&self.activation)?
            .apply(&self.lin2)
    }
}

#[derive(Debug, Clone)]
struct TransformerBlock {
    attention: MultiHeadSelfAttention,
    sa_layer_norm: LayerNorm,
    ffn: FeedForward,
    output_layer_norm: LayerNorm,
}

impl TransformerBlock {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        Ok(Self {
            attention: MultiHeadSelfAttention::load(vb.pp("attention"), config)?,
            sa_layer_norm: layer_norm(config.dim, LAYER_NORM_EPS, vb.pp("sa_layer_norm"))?,
            ffn: FeedForward::load(vb.pp("ffn"), config)?,
            output_layer_norm: layer_norm(
                config.dim,
                LAYER_NORM_EPS,
                vb.pp("output_layer_norm"),
            )?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let attention_output = self.attention.forward(hidden_states, attention_mask)?;
        let hidden_states = (attention_output + hidden_states)?.apply(&self.sa_layer_norm)?;
        let ffn_output = hidden_states.apply(&self.ffn)?;
        (ffn_output + hidden_states)?.apply(&self.output_layer_norm)
    }
}

/// The DistilBERT encoder without any task head.
#[derive(Debug, Clone)]
pub struct DistilBertModel {
    embeddings: Embeddings,
    layers: Vec<TransformerBlock>,
    dtype: DType,
    device: Device,
}

impl DistilBertModel {
    pub fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let embeddings = Embeddings::load(vb.pp("embeddings"), config)?;
        let layers = (0..config.n_layers)
            .map(|index| TransformerBlock::load(vb.pp(format!("transformer.layer.{index}")), config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            embeddings,
            layers,
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    /// Turns a `(batch, seq)` padding mask (1 keep, 0 pad) into an additive
    /// `(batch, 1, 1, seq)` attention bias.
    fn attention_bias(&self, attention_mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len) = attention_mask.dims2()?;
        let mask = attention_mask
            .to_dtype(DType::F32)?
            .reshape((batch, 1, 1, seq_len))?;
        ((1.0 - mask)? * MIN_VALUE_F64)?.to_dtype(self.dtype)
    }

    /// Hidden states with shape `(batch_size, sequence_length, dim)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let attention_bias = self.attention_bias(attention_mask)?;
        let mut hidden_states = input_ids.apply(&self.embeddings)?;
        for layer in &self.layers {
            hidden_states = layer.forward(&hidden_states, &attention_bias)?;
        }
        Ok(hidden_states)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// DistilBERT with the sequence-classification head.
#[derive(Debug, Clone)]
pub struct DistilBertForSequenceClassification {
    distilbert: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
}

impl DistilBertForSequenceClassification {
    pub fn load(vb: VarBuilder, config: &Config, num_labels: usize) -> Result<Self> {
        let distilbert = DistilBertModel::load(vb.pp(ENCODER_PREFIX), config)?;
        let pre_classifier = linear(config.dim, config.dim, vb.pp("pre_classifier"))?;
        let classifier = linear(config.dim, num_labels, vb.pp("classifier"))?;
        Ok(Self {
            distilbert,
            pre_classifier,
            classifier,
        })
    }

    /// Logits with shape `(batch_size, num_labels)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let hidden_states = self.distilbert.forward(input_ids, attention_mask)?;
        hidden_states
            .i((.., 0, ..))?
            .contiguous()?
            .apply(&self.pre_classifier)?
            .relu()?
            .apply(&self.classifier)
    }

    pub fn device(&self) -> &Device {
        self.distilbert.device()
    }
}

/// Bare encoder checkpoints store `embeddings.*` / `transformer.*` without the
/// `distilbert.` prefix used by the task models.
pub fn canonical_tensor_name(name: &str) -> String {
    if name.starts_with("embeddings.") || name.starts_with("transformer.") {
        format!("{ENCODER_PREFIX}.{name}")
    } else {
        name.to_string()
    }
}

/// Fills in classification head tensors that neither the base checkpoint nor
/// the adapter provide. Weights are drawn from a fixed-seed uniform
/// distribution with standard deviation `initializer_range`, biases are zero,
/// so repeated loads produce the same head. Returns the names that were filled.
pub fn init_missing_head(
    weights: &mut HashMap<String, Tensor>,
    config: &Config,
    num_labels: usize,
    device: &Device,
) -> Result<Vec<String>> {
    let bound = (config.initializer_range * 3f64.sqrt()) as f32;
    let mut rng = StdRng::seed_from_u64(HEAD_INIT_SEED);
    let mut filled = Vec::new();

    for (name, shape) in config.head_shapes(num_labels) {
        if weights.contains_key(&name) {
            continue;
        }
        let tensor = if name.ends_with(".bias") {
            Tensor::zeros(shape.as_slice(), DType::F32, device)?
        } else {
            let len: usize = shape.iter().product();
            let data: Vec<f32> = (0..len).map(|_| rng.random_range(-bound..bound)).collect();
            Tensor::from_vec(data, shape.as_slice(), device)?
        };
        weights.insert(name.clone(), tensor);
        filled.push(name);
    }
    Ok(filled)
}
