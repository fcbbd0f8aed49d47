// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Evaluation settings: TOML file, then `RAGSCORE_*` environment overrides

use crate::EvalError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Configuration for metric execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Rows per `generate` call
    pub batch_size: usize,

    /// Completions sampled per prompt by answer relevancy
    pub strictness: usize,

    /// Maximum number of examples aggregated concurrently
    pub max_concurrent: usize,

    /// Target language for prompt adaptation; `None` keeps the built-ins
    pub language: Option<String>,

    /// Directory for adapted templates; `None` uses the store default
    pub cache_dir: Option<PathBuf>,

    pub model: String,
    pub embedding_model: String,
    pub base_url: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            batch_size: 15,
            strictness: 3,
            max_concurrent: 10,
            language: None,
            cache_dir: None,
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl EvalConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EvalError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| EvalError::Config(e.to_string()))
    }

    /// Load from an optional file, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self, EvalError> {
        let config = match config_file {
            Some(path) if path.exists() => {
                info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        let config = config.merge_with_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables (env takes priority).
    ///
    /// Supported environment variables:
    /// - RAGSCORE_BATCH_SIZE
    /// - RAGSCORE_STRICTNESS
    /// - RAGSCORE_MAX_CONCURRENT
    /// - RAGSCORE_LANGUAGE
    /// - RAGSCORE_CACHE_DIR
    /// - RAGSCORE_MODEL
    /// - RAGSCORE_EMBEDDING_MODEL
    /// - RAGSCORE_BASE_URL
    pub fn merge_with_env(self) -> Self {
        self.merge_with(|key| std::env::var(key).ok())
    }

    fn merge_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_var(&lookup, "RAGSCORE_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGSCORE_STRICTNESS") {
            self.strictness = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGSCORE_MAX_CONCURRENT") {
            self.max_concurrent = v;
        }
        if let Some(language) = lookup("RAGSCORE_LANGUAGE") {
            self.language = Some(language);
        }
        if let Some(dir) = lookup("RAGSCORE_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(model) = lookup("RAGSCORE_MODEL") {
            self.model = model;
        }
        if let Some(model) = lookup("RAGSCORE_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Some(url) = lookup("RAGSCORE_BASE_URL") {
            self.base_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.batch_size == 0 {
            return Err(EvalError::Config("batch_size must be at least 1".to_string()));
        }
        if self.strictness == 0 {
            return Err(EvalError::Config("strictness must be at least 1".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(EvalError::Config(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}
