//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.thinkchat/config.json`) and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::OllamaClient;
use crate::session::DEFAULT_SYSTEM_PROMPT;

pub const DEFAULT_MODEL: &str = "deepseek-r1";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Ollama connection settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Model and prompt used for chat turns.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Ollama connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaConfig {
    /// Base URL (default http://127.0.0.1:11434). Overridden by THINKCHAT_OLLAMA_URL env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Model name as shown by `ollama list` (default "deepseek-r1"). Overridden by THINKCHAT_MODEL env.
    #[serde(default = "default_model")]
    pub model: String,

    /// System message every conversation starts with.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Ollama base URL: env THINKCHAT_OLLAMA_URL overrides config.
pub fn resolve_ollama_url(config: &Config) -> Option<String> {
    env_non_empty("THINKCHAT_OLLAMA_URL").or_else(|| {
        config
            .ollama
            .base_url
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the chat model: explicit override (e.g. a CLI flag), then env THINKCHAT_MODEL,
/// then config, then the default.
pub fn resolve_model(config: &Config, explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| env_non_empty("THINKCHAT_MODEL"))
        .or_else(|| {
            let m = config.chat.model.trim();
            (!m.is_empty()).then(|| m.to_string())
        })
        .unwrap_or_else(default_model)
}

/// Build an Ollama client from the resolved base URL.
pub fn ollama_client(config: &Config) -> OllamaClient {
    OllamaClient::new(resolve_ollama_url(config))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("THINKCHAT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".thinkchat").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_deepseek_setup() {
        let c = Config::default();
        assert_eq!(c.chat.model, "deepseek-r1");
        assert_eq!(c.chat.system_prompt, "You are a helpful assistant.");
        assert_eq!(c.ollama.base_url, None);
    }

    #[test]
    fn empty_object_parses_to_defaults() {
        let c: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(c.chat.model, DEFAULT_MODEL);
        assert_eq!(c.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn camel_case_keys() {
        let c: Config = serde_json::from_str(
            r#"{"ollama":{"baseUrl":"http://gpu-box:11434"},"chat":{"model":"qwen3:8b","systemPrompt":"Be terse."}}"#,
        )
        .unwrap();
        assert_eq!(c.ollama.base_url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(c.chat.model, "qwen3:8b");
        assert_eq!(c.chat.system_prompt, "Be terse.");
    }

    #[test]
    fn explicit_model_wins_and_blank_is_ignored() {
        let mut c = Config::default();
        c.chat.model = "from-config".to_string();
        assert_eq!(resolve_model(&c, Some("  from-flag ")), "from-flag");
        // Blank flag falls through (THINKCHAT_MODEL is not set in the test environment).
        if std::env::var("THINKCHAT_MODEL").is_err() {
            assert_eq!(resolve_model(&c, Some("   ")), "from-config");
            c.chat.model = " ".to_string();
            assert_eq!(resolve_model(&c, None), DEFAULT_MODEL);
        }
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!(
            "thinkchat-missing-{}/config.json",
            uuid::Uuid::new_v4()
        ));
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.chat.model, DEFAULT_MODEL);
    }

    #[test]
    fn load_reports_bad_json() {
        let dir = std::env::temp_dir().join(format!("thinkchat-bad-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config(Some(path)).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
