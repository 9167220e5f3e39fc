//! Embedding / LLM provider selection.
//!
//! The configured provider is resolved once into a [`Provider`] value; the
//! embedder and generator are built from it. A provider that cannot serve a
//! capability is rejected with [`ProviderError::Unsupported`], never replaced
//! by another backend.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::ProviderConfig;
use crate::embedder::{Embedder, EmbedderError, ollama::OllamaEmbedder, openai::OpenAiEmbedder};
use crate::generation::{
    GenerationError, Generator, anthropic::AnthropicGenerator, ollama::OllamaGenerator,
    openai::OpenAiGenerator,
};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("unknown provider {0:?} (expected OLLAMA, OPENAI or ANTHROPIC)")]
    Unknown(String),

    #[error("{provider} does not support {capability}")]
    Unsupported {
        provider: ProviderKind,
        capability: &'static str,
    },

    #[error("{provider} requires {setting} to be set")]
    MissingSetting {
        provider: ProviderKind,
        setting: &'static str,
    },

    #[error(transparent)]
    Embedder(#[from] EmbedderError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Embedding width of the default model, used when none is configured.
    #[must_use]
    pub fn default_dimensions(self) -> usize {
        match self {
            Self::Ollama => 768,
            Self::OpenAi => 1536,
            Self::Anthropic => 0,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ollama => "OLLAMA",
            Self::OpenAi => "OPENAI",
            Self::Anthropic => "ANTHROPIC",
        })
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OLLAMA" => Ok(Self::Ollama),
            "OPENAI" => Ok(Self::OpenAi),
            "ANTHROPIC" => Ok(Self::Anthropic),
            _ => Err(ProviderError::Unknown(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
enum Backend {
    Ollama {
        url: String,
        llm_model: String,
        embedding_model: String,
    },
    OpenAi {
        api_key: String,
        base_url: String,
        embedding_model: String,
        chat_model: String,
    },
    Anthropic {
        api_key: String,
        chat_model: String,
    },
}

/// A provider resolved from configuration, with every required setting present.
#[derive(Debug, Clone)]
pub struct Provider {
    backend: Backend,
    temperature: f32,
    timeout: Duration,
    embedding_dimensions: Option<usize>,
}

impl Provider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self, ProviderError> {
        let kind = cfg.use_provider;
        let backend = match kind {
            ProviderKind::Ollama => Backend::Ollama {
                url: require(kind, "OLLAMA_URL", cfg.ollama_url.as_deref())?,
                llm_model: cfg.ollama_llm_model.clone(),
                embedding_model: cfg.ollama_embedding_model.clone(),
            },
            ProviderKind::OpenAi => Backend::OpenAi {
                api_key: require(kind, "OPENAI_API_KEY", cfg.openai_api_key.as_deref())?,
                base_url: cfg.openai_base_url.clone(),
                embedding_model: cfg.openai_embedding_model.clone(),
                chat_model: cfg.openai_chat_model.clone(),
            },
            ProviderKind::Anthropic => Backend::Anthropic {
                api_key: require(kind, "ANTHROPIC_API_KEY", cfg.anthropic_api_key.as_deref())?,
                chat_model: cfg.anthropic_chat_model.clone(),
            },
        };

        info!("Using provider {kind}");

        Ok(Self {
            backend,
            temperature: cfg.temperature,
            timeout: Duration::from_secs(cfg.timeout_secs),
            embedding_dimensions: cfg.embedding_dimensions,
        })
    }

    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self.backend {
            Backend::Ollama { .. } => ProviderKind::Ollama,
            Backend::OpenAi { .. } => ProviderKind::OpenAi,
            Backend::Anthropic { .. } => ProviderKind::Anthropic,
        }
    }

    /// Build the embedding client for this provider.
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>, ProviderError> {
        let dimensions = self
            .embedding_dimensions
            .unwrap_or_else(|| self.kind().default_dimensions());

        match &self.backend {
            Backend::Ollama {
                url,
                embedding_model,
                ..
            } => Ok(Arc::new(OllamaEmbedder::new(
                url,
                embedding_model,
                dimensions,
                self.timeout,
            )?)),
            Backend::OpenAi {
                api_key,
                base_url,
                embedding_model,
                ..
            } => Ok(Arc::new(OpenAiEmbedder::new(
                base_url,
                api_key,
                embedding_model,
                dimensions,
                self.timeout,
            )?)),
            Backend::Anthropic { .. } => Err(ProviderError::Unsupported {
                provider: ProviderKind::Anthropic,
                capability: "embeddings",
            }),
        }
    }

    /// Build the chat client for this provider.
    pub fn generator(&self) -> Result<Arc<dyn Generator>, ProviderError> {
        match &self.backend {
            Backend::Ollama { url, llm_model, .. } => Ok(Arc::new(OllamaGenerator::new(
                url,
                llm_model,
                self.temperature,
                self.timeout,
            )?)),
            Backend::OpenAi {
                api_key,
                base_url,
                chat_model,
                ..
            } => Ok(Arc::new(OpenAiGenerator::new(
                base_url,
                api_key,
                chat_model,
                self.temperature,
                self.timeout,
            )?)),
            Backend::Anthropic {
                api_key,
                chat_model,
            } => Ok(Arc::new(AnthropicGenerator::new(
                api_key,
                chat_model,
                self.temperature,
                self.timeout,
            )?)),
        }
    }
}

fn require(
    provider: ProviderKind,
    setting: &'static str,
    value: Option<&str>,
) -> Result<String, ProviderError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ProviderError::MissingSetting { provider, setting }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: ProviderKind) -> ProviderConfig {
        ProviderConfig {
            use_provider: kind,
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!(" OpenAI ".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("ANTHROPIC".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert!(matches!(
            "gemini".parse::<ProviderKind>(),
            Err(ProviderError::Unknown(_))
        ));
    }

    #[test]
    fn test_kind_serde_uppercase() {
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).unwrap(), "\"OPENAI\"");
        let kind: ProviderKind = serde_json::from_str("\"ANTHROPIC\"").unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
    }

    #[test]
    fn test_ollama_requires_url() {
        let err = Provider::from_config(&config(ProviderKind::Ollama)).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingSetting {
                setting: "OLLAMA_URL",
                ..
            }
        ));
    }

    #[test]
    fn test_openai_requires_key() {
        let mut cfg = config(ProviderKind::OpenAi);
        cfg.openai_api_key = Some("   ".into());
        assert!(matches!(
            Provider::from_config(&cfg),
            Err(ProviderError::MissingSetting {
                setting: "OPENAI_API_KEY",
                ..
            })
        ));
    }

    #[test]
    fn test_anthropic_has_no_embedder() {
        let mut cfg = config(ProviderKind::Anthropic);
        cfg.anthropic_api_key = Some("sk-ant-test".into());
        let provider = Provider::from_config(&cfg).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Anthropic);

        assert!(matches!(
            provider.embedder(),
            Err(ProviderError::Unsupported {
                provider: ProviderKind::Anthropic,
                capability: "embeddings"
            })
        ));
        assert!(provider.generator().is_ok());
    }

    #[test]
    fn test_ollama_embedder_dimensions() {
        let mut cfg = config(ProviderKind::Ollama);
        cfg.ollama_url = Some("http://localhost:11434".into());
        let provider = Provider::from_config(&cfg).unwrap();
        assert_eq!(provider.embedder().unwrap().dimensions(), 768);

        cfg.embedding_dimensions = Some(1024);
        let provider = Provider::from_config(&cfg).unwrap();
        assert_eq!(provider.embedder().unwrap().dimensions(), 1024);
    }
}
