//! The `Config` value (spec §6).
//!
//! The interactive CLI/TUI front-end is an external collaborator that
//! constructs this value and hands it to the engine; this module still owns
//! the type and its load-from-disk/env defaults so every component agrees
//! on where the embedding key, model, and index root come from.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    INDEX_DIR_NAME,
};
use crate::error::{CodebasedError, Result};

/// Engine configuration, loaded once at startup and passed explicitly from
/// then on (spec §9 "Global state": no process-wide config singleton).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub embedding_api_key: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default)]
    pub editor_command: Option<String>,
    #[serde(default)]
    pub index_root: Option<PathBuf>,
    /// Base URL for the embedding HTTP endpoint. Not part of spec.md's key
    /// list but required to actually reach a remote provider; defaults to
    /// the OpenAI-compatible embeddings endpoint implied by the default
    /// model id.
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}

impl Config {
    /// Load from `$HOME/.codebased/config.toml`, falling back to
    /// `EMBEDDING_API_KEY`/`EDITOR` environment variables for the keys the
    /// file omits. Fatal (`CodebasedError::Config`) if no API key can be
    /// found anywhere.
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Config {
                embedding_api_key: String::new(),
                embedding_model: default_embedding_model(),
                embedding_dimension: default_embedding_dimension(),
                editor_command: None,
                index_root: None,
                embedding_base_url: default_embedding_base_url(),
            }
        };

        if config.embedding_api_key.is_empty() {
            if let Ok(key) = env::var("EMBEDDING_API_KEY") {
                config.embedding_api_key = key;
            }
        }
        if config.editor_command.is_none() {
            config.editor_command = env::var("EDITOR").ok();
        }

        if config.embedding_api_key.is_empty() {
            return Err(CodebasedError::Config(
                "no embedding_api_key in config.toml and EMBEDDING_API_KEY is unset".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CodebasedError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| CodebasedError::Config(e.to_string()))
    }

    /// Resolve the on-disk index root for a given repository root
    /// (defaults to `.codebased` under the repo, per spec §6).
    pub fn index_root_for(&self, repo_root: &Path) -> PathBuf {
        self.index_root
            .clone()
            .unwrap_or_else(|| repo_root.join(INDEX_DIR_NAME))
    }
}

fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        CodebasedError::Config("could not determine home directory".to_string())
    })?;
    Ok(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Persisted schema/model metadata (`meta.toml`, spec §6). A mismatch
/// against the running config's model/dimension or this crate's schema
/// version triggers a full rebuild (handled by `crate::doctor`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub schema_version: u32,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

/// Bump whenever the catalog/FTS/ANN on-disk schema changes incompatibly.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

impl IndexMeta {
    pub fn current(config: &Config) -> Self {
        IndexMeta {
            schema_version: CURRENT_SCHEMA_VERSION,
            embedding_model: config.embedding_model.clone(),
            embedding_dimension: config.embedding_dimension,
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path).map_err(|e| CodebasedError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let meta: IndexMeta =
            toml::from_str(&text).map_err(|e| CodebasedError::Config(e.to_string()))?;
        Ok(Some(meta))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| CodebasedError::Config(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| CodebasedError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Whether this metadata is still compatible with `other` (i.e. no
    /// rebuild is required).
    pub fn compatible_with(&self, other: &IndexMeta) -> bool {
        self == other
    }
}
