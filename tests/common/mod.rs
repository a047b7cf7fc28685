#![allow(dead_code)]

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use candle_core::{Device, Tensor};
use sentiment_lora::{SentimentAnalysisModel, SentimentAnalysisPipeline};
use tokenizers::Tokenizer;

const GREAT: u32 = 4;
const AWFUL: u32 = 5;
const EXPLODE: u32 = 8;

/// Lowercasing whitespace tokenizer with BERT style `[CLS] ... [SEP]` framing.
pub fn tokenizer() -> Tokenizer {
    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "BertProcessing",
            "sep": ["[SEP]", 3],
            "cls": ["[CLS]", 2]
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "[PAD]": 0,
                "[UNK]": 1,
                "[CLS]": 2,
                "[SEP]": 3,
                "great": GREAT,
                "awful": AWFUL,
                "movie": 6,
                "the": 7,
                "explode": EXPLODE,
                "was": 9,
                "plot": 10
            },
            "unk_token": "[UNK]"
        }
    });
    Tokenizer::from_str(&json.to_string()).expect("valid tokenizer json")
}

/// Scores a text by counting `great` (positive) and `awful` (negative).
/// Fails on any text containing `explode`.
pub struct KeywordModel {
    pub calls: AtomicUsize,
    pub longest_sequence: AtomicUsize,
    device: Device,
}

impl Default for KeywordModel {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            longest_sequence: AtomicUsize::new(0),
            device: Device::Cpu,
        }
    }
}

impl SentimentAnalysisModel for KeywordModel {
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ids = input_ids.to_vec2::<u32>()?;
        let mask = attention_mask.to_vec2::<u32>()?;
        assert_eq!(ids[0].len(), mask[0].len());
        self.longest_sequence.fetch_max(ids[0].len(), Ordering::SeqCst);

        if ids[0].contains(&EXPLODE) {
            anyhow::bail!("forward pass exploded");
        }
        let positive = ids[0].iter().filter(|&&id| id == GREAT).count() as f32;
        let negative = ids[0].iter().filter(|&&id| id == AWFUL).count() as f32;
        Ok(Tensor::new(&[[negative, positive]], &Device::Cpu)?)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Always fails, as a model with corrupted internal state would.
pub struct BrokenModel {
    device: Device,
}

impl SentimentAnalysisModel for BrokenModel {
    fn forward(&self, _input_ids: &Tensor, _attention_mask: &Tensor) -> anyhow::Result<Tensor> {
        anyhow::bail!("malformed internal state")
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

pub fn keyword_pipeline() -> SentimentAnalysisPipeline<KeywordModel> {
    SentimentAnalysisPipeline::new(KeywordModel::default(), tokenizer()).unwrap()
}

pub fn broken_pipeline() -> SentimentAnalysisPipeline<BrokenModel> {
    SentimentAnalysisPipeline::new(BrokenModel { device: Device::Cpu }, tokenizer()).unwrap()
}
