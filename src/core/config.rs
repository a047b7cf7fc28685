use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Hugging Face repository of the base checkpoint.
pub const DEFAULT_BASE_MODEL: &str = "distilbert-base-uncased";
/// Local directory holding `adapter_config.json` and the adapter weights.
pub const DEFAULT_ADAPTER_PATH: &str = "./lora-sentiment";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Inputs longer than this are truncated by the tokenizer.
pub const MAX_TOKEN_LENGTH: usize = 128;
/// Output classes of the classifier head: 0 = Negative, 1 = Positive.
pub const NUM_LABELS: usize = 2;

/// Process configuration. Every field defaults to the fixed deployment value
/// and can be overridden from the command line or the environment.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct ServiceConfig {
    /// Address to listen on.
    #[arg(long, env = "API_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "API_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Base checkpoint repository on the Hugging Face Hub.
    #[arg(long, env = "BASE_MODEL", default_value = DEFAULT_BASE_MODEL)]
    pub base_model: String,

    /// Git revision (branch, tag, commit hash) of the base checkpoint.
    #[arg(long, env = "BASE_MODEL_REVISION", default_value = "main")]
    pub revision: String,

    /// Directory containing the LoRA adapter overlay.
    #[arg(long, env = "ADAPTER_PATH", default_value = DEFAULT_ADAPTER_PATH)]
    pub adapter_path: PathBuf,

    /// Run on the CPU even if CUDA is available.
    #[arg(long, env = "FORCE_CPU")]
    pub cpu: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            base_model: DEFAULT_BASE_MODEL.to_string(),
            revision: "main".to_string(),
            adapter_path: PathBuf::from(DEFAULT_ADAPTER_PATH),
            cpu: false,
        }
    }
}

impl ServiceConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {e}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_values() {
        let config = ServiceConfig::try_parse_from(["sentiment-lora"]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.base_model, "distilbert-base-uncased");
        assert_eq!(config.adapter_path, PathBuf::from("./lora-sentiment"));
        assert!(!config.cpu);
        assert_eq!(
            config.socket_addr().unwrap(),
            "0.0.0.0:8000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServiceConfig::try_parse_from([
            "sentiment-lora",
            "--port",
            "9100",
            "--adapter-path",
            "/srv/adapters/imdb",
            "--cpu",
        ])
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.adapter_path, PathBuf::from("/srv/adapters/imdb"));
        assert!(config.cpu);
    }

    #[test]
    fn invalid_host_is_rejected() {
        let config = ServiceConfig {
            host: "not a host".into(),
            ..ServiceConfig::default()
        };
        assert!(config.socket_addr().is_err());
    }
}
