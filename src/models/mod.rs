pub mod distilbert;
pub mod lora;
pub mod sentiment_distilbert;

pub use lora::{LoraAdapter, LoraConfig};
pub use sentiment_distilbert::LoraDistilBertModel;
