//! Configuration loading.
//!
//! A typed `Settings` struct loaded from `~/.codesearch/config.toml`, in the
//! teacher's style of TOML-backed config (`toml` crate, `serde`-derived
//! structs). Interactive prompting and credential entry are out of scope;
//! this only defines the shape the core subsystems are configured through.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub url: String,
    pub model: String,
    pub dimensions: usize,
    /// Name of the environment variable holding the API key. Credential
    /// entry itself is out of scope; we only read the env var by name.
    pub api_key_env: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        EmbeddingsConfig {
            url: "https://api.openai.com/v1/embeddings".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub batch_size_limit: usize,
    pub batch_token_limit: usize,
    pub per_request_token_cap: usize,
    pub debounce_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        IndexingConfig {
            batch_size_limit: 2048,
            batch_token_limit: 400_000,
            per_request_token_cap: 8192,
            debounce_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs_home().map(|h| h.join(".codesearch").join("config.toml"))
    }

    pub fn load_or_default(path: Option<&PathBuf>) -> Self {
        let path = path.cloned().or_else(Self::default_path);
        match path {
            Some(p) => match std::fs::read_to_string(&p) {
                Ok(text) => toml::from_str(&text).unwrap_or_default(),
                Err(_) => Settings::default(),
            },
            None => Settings::default(),
        }
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
