/// Configuration module for ragdelta.
///
/// Handles loading, environment overrides, validation, and default values.
/// The resulting [`Config`] is passed explicitly to each component.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::provider::ProviderKind;

const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_index_dir() -> String {
    "./sample_runs".to_string()
}

fn default_db_path() -> String {
    "./data/embeddings/vectors.db".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_search_top_k() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ollama_llm_model() -> String {
    "qwen2.5-coder:7b-8k".to_string()
}

fn default_ollama_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_openai_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_chat_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    60
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Root directory scanned by `embed`.
    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub use_provider: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_url: Option<String>,

    #[serde(default = "default_ollama_llm_model")]
    pub ollama_llm_model: String,

    #[serde(default = "default_ollama_embedding_model")]
    pub ollama_embedding_model: String,

    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_openai_embedding_model")]
    pub openai_embedding_model: String,

    #[serde(default = "default_openai_chat_model")]
    pub openai_chat_model: String,

    #[serde(default, skip_serializing)]
    pub anthropic_api_key: Option<String>,

    #[serde(default = "default_anthropic_chat_model")]
    pub anthropic_chat_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Overrides the provider's default embedding width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dimensions: Option<usize>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            db_path: default_db_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_top_k: default_search_top_k(),
            log_level: default_log_level(),
            provider: ProviderConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            use_provider: ProviderKind::default(),
            ollama_url: None,
            ollama_llm_model: default_ollama_llm_model(),
            ollama_embedding_model: default_ollama_embedding_model(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            openai_embedding_model: default_openai_embedding_model(),
            openai_chat_model: default_openai_chat_model(),
            anthropic_api_key: None,
            anthropic_chat_model: default_anthropic_chat_model(),
            temperature: default_temperature(),
            embedding_dimensions: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and
    /// generates a template file for the default path only.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Load from `config_path`, apply process environment overrides, validate.
    pub fn load_with_env(config_path: &str) -> Result<Self> {
        let mut cfg = Self::load(config_path)?;
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Save configuration to a JSON file. API keys are never written.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Override fields from environment variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("INDEX_DIR") {
            self.index_dir = v;
        }
        if let Some(v) = var("EMBEDDING_DB") {
            self.db_path = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }

        let p = &mut self.provider;
        if let Some(v) = var("USE_PROVIDER") {
            p.use_provider = v
                .parse::<ProviderKind>()
                .with_context(|| format!("invalid USE_PROVIDER: {v}"))?;
        }
        if let Some(v) = var("OLLAMA_URL") {
            p.ollama_url = Some(v);
        }
        if let Some(v) = var("OLLAMA_LLM_MODEL") {
            p.ollama_llm_model = v;
        }
        if let Some(v) = var("OLLAMA_EMBEDDING_MODEL") {
            p.ollama_embedding_model = v;
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            p.openai_api_key = Some(v);
        }
        if let Some(v) = var("OPENAI_EMBEDDING_MODEL") {
            p.openai_embedding_model = v;
        }
        if let Some(v) = var("ANTHROPIC_API_KEY") {
            p.anthropic_api_key = Some(v);
        }

        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(!self.index_dir.is_empty(), "index_dir must not be empty");
        anyhow::ensure!(!self.db_path.is_empty(), "db_path must not be empty");
        anyhow::ensure!(
            self.provider.embedding_dimensions != Some(0),
            "provider.embedding_dimensions must be positive"
        );
        Ok(())
    }

    #[must_use]
    pub fn index_root(&self) -> PathBuf {
        PathBuf::from(&self.index_dir)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.index_dir, "./sample_runs");
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.search_top_k, 5);
        assert_eq!(config.provider.use_provider, ProviderKind::Ollama);
        assert_eq!(config.provider.ollama_embedding_model, "nomic-embed-text");
        assert!((config.provider.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_size": 500, "provider": {"use_provider": "OPENAI"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.provider.use_provider, ProviderKind::OpenAi);
        // Other fields should have defaults
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.provider.openai_chat_model, "gpt-4o-mini");
    }

    #[test]
    fn test_load_missing_explicit_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.db_path, "./data/embeddings/vectors.db");
        // No template for non-default paths
        assert!(!path.exists());
    }

    #[test]
    fn test_load_invalid_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chunk_size, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("INDEX_DIR", "/srv/docs"),
                ("EMBEDDING_DB", "/srv/index.db"),
                ("USE_PROVIDER", "openai"),
                ("OPENAI_API_KEY", "sk-test"),
                ("OLLAMA_URL", ""),
            ]))
            .unwrap();

        assert_eq!(config.index_dir, "/srv/docs");
        assert_eq!(config.db_path, "/srv/index.db");
        assert_eq!(config.provider.use_provider, ProviderKind::OpenAi);
        assert_eq!(config.provider.openai_api_key.as_deref(), Some("sk-test"));
        // Blank values are ignored
        assert!(config.provider.ollama_url.is_none());
    }

    #[test]
    fn test_env_unknown_provider() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("USE_PROVIDER", "bard")])).is_err());
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_must_be_smaller() {
        let mut config = Config::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_keys_not_serialized() {
        let mut config = Config::default();
        config.provider.openai_api_key = Some("sk-secret".into());
        config.provider.anthropic_api_key = Some("sk-ant-secret".into());
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(!json.contains("secret"));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunk_size, config.chunk_size);
        assert!(parsed.provider.openai_api_key.is_none());
    }
}
