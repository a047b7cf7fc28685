//! LoRA adapter overlays in the PEFT on-disk format.
//!
//! An adapter directory holds `adapter_config.json` and the adapter tensors in
//! `adapter_model.safetensors` (or the older `adapter_model.bin`). Each targeted
//! linear layer gets a pair of low-rank matrices `A: (r, in)` and `B: (out, r)`
//! which are folded into the base weight once at load time:
//!
//! ```text
//! W' = W + scale * (B @ A)       scale = lora_alpha / r   (or / sqrt(r) with rsLoRA)
//! ```
//!
//! Tensors that are not LoRA factors (`modules_to_save` copies such as the
//! classifier head, or trained biases) replace the base tensor of the same name.

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::loaders::{read_json, read_tensors};

pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";
const ADAPTER_WEIGHT_FILES: [&str; 2] = ["adapter_model.safetensors", "adapter_model.bin"];

const PEFT_PREFIX: &str = "base_model.model.";
const LORA_A_SUFFIX: &str = ".lora_A.weight";
const LORA_B_SUFFIX: &str = ".lora_B.weight";

/// `target_modules` is either a list of module names or a single pattern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TargetModules {
    List(Vec<String>),
    Pattern(String),
}

impl Default for TargetModules {
    fn default() -> Self {
        TargetModules::List(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoraConfig {
    pub r: usize,
    pub lora_alpha: f64,
    #[serde(default)]
    pub target_modules: TargetModules,
    #[serde(default)]
    pub modules_to_save: Option<Vec<String>>,
    #[serde(default)]
    pub fan_in_fan_out: bool,
    #[serde(default)]
    pub use_rslora: bool,
    #[serde(default)]
    pub base_model_name_or_path: Option<String>,
    #[serde(default)]
    pub peft_type: Option<String>,
}

impl LoraConfig {
    pub fn scaling(&self) -> f64 {
        if self.use_rslora {
            self.lora_alpha / (self.r as f64).sqrt()
        } else {
            self.lora_alpha / self.r as f64
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(peft_type) = &self.peft_type {
            if !peft_type.eq_ignore_ascii_case("LORA") {
                anyhow::bail!("Unsupported adapter type `{peft_type}`, expected LORA");
            }
        }
        if self.r == 0 {
            anyhow::bail!("Adapter rank `r` must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct LoraPair {
    a: Option<Tensor>,
    b: Option<Tensor>,
}

/// Summary of what an adapter changed in the base weights.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merged_modules: Vec<String>,
    pub replaced_tensors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoraAdapter {
    pub config: LoraConfig,
    pub path: PathBuf,
    pairs: BTreeMap<String, LoraPair>,
    overrides: BTreeMap<String, Tensor>,
}

impl LoraAdapter {
    /// Reads the adapter config and tensors from `dir` onto `device`.
    pub fn load(dir: impl AsRef<Path>, device: &Device) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            anyhow::bail!("Adapter directory {dir:?} does not exist");
        }

        let config: LoraConfig = read_json(&dir.join(ADAPTER_CONFIG_FILE))?;
        config.validate()?;

        let weights_path = ADAPTER_WEIGHT_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Adapter weights not found in {dir:?}. Expected `{}` or `{}`",
                    ADAPTER_WEIGHT_FILES[0],
                    ADAPTER_WEIGHT_FILES[1]
                )
            })?;
        let tensors = read_tensors(&weights_path, device)?;

        Self::from_tensors(config, dir.to_path_buf(), tensors)
    }

    pub fn from_tensors(
        config: LoraConfig,
        path: PathBuf,
        tensors: HashMap<String, Tensor>,
    ) -> anyhow::Result<Self> {
        let mut pairs: BTreeMap<String, LoraPair> = BTreeMap::new();
        let mut overrides = BTreeMap::new();

        for (raw_name, tensor) in tensors {
            let name = normalize_key(&raw_name);
            if let Some(module) = name.strip_suffix(LORA_A_SUFFIX) {
                pairs.entry(module.to_string()).or_default().a = Some(tensor);
            } else if let Some(module) = name.strip_suffix(LORA_B_SUFFIX) {
                pairs.entry(module.to_string()).or_default().b = Some(tensor);
            } else if name.contains("lora_embedding_") || name.contains("lora_magnitude") {
                anyhow::bail!("Unsupported adapter tensor `{raw_name}`");
            } else {
                overrides.insert(name, tensor);
            }
        }

        Ok(Self {
            config,
            path,
            pairs,
            overrides,
        })
    }

    /// Folds the adapter into `weights` in place.
    pub fn merge_into(&self, weights: &mut HashMap<String, Tensor>) -> anyhow::Result<MergeReport> {
        let scaling = self.config.scaling();
        let mut report = MergeReport::default();

        for (module, pair) in &self.pairs {
            let (a, b) = match (&pair.a, &pair.b) {
                (Some(a), Some(b)) => (a, b),
                (Some(_), None) => anyhow::bail!("Adapter module `{module}` has lora_A but no lora_B"),
                (None, _) => anyhow::bail!("Adapter module `{module}` has lora_B but no lora_A"),
            };
            let weight_name = format!("{module}.weight");
            let base = weights.get(&weight_name).ok_or_else(|| {
                anyhow::anyhow!("Adapter targets `{module}`, which is not in the base checkpoint")
            })?;

            let merged = merge_pair(base, a, b, scaling, self.config.fan_in_fan_out)
                .with_context(|| format!("merging adapter into `{module}`"))?;
            weights.insert(weight_name, merged);
            report.merged_modules.push(module.clone());
        }

        for (name, tensor) in &self.overrides {
            if let Some(base) = weights.get(name) {
                if base.dims() != tensor.dims() {
                    anyhow::bail!(
                        "Adapter tensor `{name}` has shape {:?}, base checkpoint has {:?}",
                        tensor.dims(),
                        base.dims()
                    );
                }
            }
            weights.insert(name.clone(), tensor.clone());
            report.replaced_tensors.push(name.clone());
        }

        Ok(report)
    }
}

fn merge_pair(
    base: &Tensor,
    a: &Tensor,
    b: &Tensor,
    scaling: f64,
    fan_in_fan_out: bool,
) -> anyhow::Result<Tensor> {
    let (rank_a, _) = a.dims2()?;
    let (_, rank_b) = b.dims2()?;
    if rank_a != rank_b {
        anyhow::bail!("lora_A has rank {rank_a} but lora_B has rank {rank_b}");
    }

    let delta = b
        .to_dtype(DType::F32)?
        .matmul(&a.to_dtype(DType::F32)?)?
        .affine(scaling, 0.0)?;
    let delta = if fan_in_fan_out { delta.t()? } else { delta };

    if delta.dims() != base.dims() {
        anyhow::bail!(
            "LoRA update has shape {:?}, base weight has {:?}",
            delta.dims(),
            base.dims()
        );
    }

    let merged = (base.to_dtype(DType::F32)? + delta)?;
    Ok(merged.to_dtype(base.dtype())?)
}

/// Maps PEFT tensor names onto base checkpoint names.
///
/// `base_model.model.classifier.modules_to_save.default.weight` -> `classifier.weight`
fn normalize_key(key: &str) -> String {
    key.strip_prefix(PEFT_PREFIX)
        .unwrap_or(key)
        .replace(".modules_to_save.default.", ".")
        .replace(".lora_A.default.", ".lora_A.")
        .replace(".lora_B.default.", ".lora_B.")
}
