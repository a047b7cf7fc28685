//! Loaders for the base checkpoint files on the Hugging Face Hub.
//!
//! ## Main Types
//!
//! - [`HfLoader`] - Generic Hugging Face file loader with retry logic
//! - [`TokenizerLoader`] - Loads `tokenizer.json`
//! - [`ModelConfigLoader`] - Loads and parses `config.json`
//! - [`WeightsLoader`] - Resolves the weight file and reads every tensor
//!
//! Files are downloaded into the local hub cache the first time and read from
//! it afterwards. All loaders retry when the hub cache lock is held by another
//! process.

use anyhow::Context;
use candle_core::{Device, Tensor};
use hf_hub::{Repo, RepoType};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct HfLoader {
    pub repo: String,
    pub revision: String,
    pub filename: String,
}

impl HfLoader {
    pub fn new(repo: &str, revision: &str, filename: &str) -> Self {
        Self {
            repo: repo.into(),
            revision: revision.into(),
            filename: filename.into(),
        }
    }

    pub async fn load(&self) -> anyhow::Result<PathBuf> {
        let hf_api = hf_hub::api::tokio::ApiBuilder::new()
            .with_progress(false)
            .build()?;
        let hf_repo = hf_api.repo(Repo::with_revision(
            self.repo.clone(),
            RepoType::Model,
            self.revision.clone(),
        ));

        let mut attempt = 0;
        loop {
            match hf_repo.get(self.filename.as_str()).await {
                Ok(path) => return Ok(path),
                Err(e) => {
                    let error_msg = e.to_string();
                    if error_msg.contains("Lock acquisition failed") && attempt < MAX_RETRIES - 1 {
                        let wait_time = std::time::Duration::from_millis(100 * (1 << attempt));
                        tracing::warn!(
                            repo = %self.repo,
                            file = %self.filename,
                            attempt,
                            "hub cache locked, retrying"
                        );
                        tokio::time::sleep(wait_time).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(anyhow::Error::new(e)
                        .context(format!("fetching {} from {}", self.filename, self.repo)));
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenizerLoader {
    pub tokenizer_file_loader: HfLoader,
}

impl TokenizerLoader {
    pub fn new(repo: &str, revision: &str) -> Self {
        Self {
            tokenizer_file_loader: HfLoader::new(repo, revision, "tokenizer.json"),
        }
    }

    pub async fn load(&self) -> anyhow::Result<Tokenizer> {
        let tokenizer_file_path = self.tokenizer_file_loader.load().await?;

        Tokenizer::from_file(&tokenizer_file_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer {tokenizer_file_path:?}: {e}"))
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfigLoader {
    pub config_file_loader: HfLoader,
}

impl ModelConfigLoader {
    pub fn new(repo: &str, revision: &str) -> Self {
        Self {
            config_file_loader: HfLoader::new(repo, revision, "config.json"),
        }
    }

    pub async fn load<C: DeserializeOwned>(&self) -> anyhow::Result<C> {
        let config_file_path = self.config_file_loader.load().await?;
        read_json(&config_file_path)
    }
}

/// Resolves the base checkpoint weights, preferring safetensors over a
/// pickled PyTorch state dict.
#[derive(Debug, Clone)]
pub struct WeightsLoader {
    safetensors: HfLoader,
    pytorch: HfLoader,
}

impl WeightsLoader {
    pub fn new(repo: &str, revision: &str) -> Self {
        Self {
            safetensors: HfLoader::new(repo, revision, "model.safetensors"),
            pytorch: HfLoader::new(repo, revision, "pytorch_model.bin"),
        }
    }

    pub async fn load(&self, device: &Device) -> anyhow::Result<HashMap<String, Tensor>> {
        let weights_filename = match self.safetensors.load().await {
            Ok(path) => path,
            Err(safetensors_err) => self.pytorch.load().await.map_err(|e| {
                anyhow::anyhow!(
                    "Model weights not found in {}. Expected `model.safetensors` or `pytorch_model.bin`: {safetensors_err:#}; {e:#}",
                    self.safetensors.repo
                )
            })?,
        };
        read_tensors(&weights_filename, device)
    }
}

/// Reads every tensor of a `.safetensors` or `.bin` file onto `device`.
pub(crate) fn read_tensors(path: &Path, device: &Device) -> anyhow::Result<HashMap<String, Tensor>> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("safetensors") => candle_core::safetensors::load(path, device)
            .with_context(|| format!("reading {path:?}")),
        Some("bin") | Some("pt") | Some("pth") => candle_core::pickle::read_all(path)
            .with_context(|| format!("reading {path:?}"))?
            .into_iter()
            .map(|(name, tensor)| -> anyhow::Result<(String, Tensor)> {
                Ok((name, tensor.to_device(device)?))
            })
            .collect(),
        _ => anyhow::bail!("Unsupported weight file format: {path:?}"),
    }
}

pub(crate) fn read_json<C: DeserializeOwned>(path: &Path) -> anyhow::Result<C> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse config file {path:?}"))
}
