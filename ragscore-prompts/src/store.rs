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


//! Persistence for adapted prompt templates, keyed by (name, language)

use crate::{PromptError, PromptTemplate};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Storage for adapted templates
pub trait TemplateStore: Send + Sync {
    fn save(&self, template: &PromptTemplate) -> Result<(), PromptError>;

    fn load(&self, name: &str, language: &str) -> Result<Option<PromptTemplate>, PromptError>;
}

/// One JSON file per template at `<cache_dir>/<language>/<name>.json`
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    cache_dir: PathBuf,
}

impl FileTemplateStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// `$RAGSCORE_CACHE_DIR`, else `~/.cache/ragscore`
    pub fn default_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("RAGSCORE_CACHE_DIR") {
            return PathBuf::from(dir);
        }
        match std::env::var("HOME") {
            Ok(home) => Path::new(&home).join(".cache").join("ragscore"),
            Err(_) => std::env::temp_dir().join("ragscore"),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn path_for(&self, name: &str, language: &str) -> PathBuf {
        self.cache_dir
            .join(sanitize(language))
            .join(format!("{}.json", sanitize(name)))
    }
}

impl Default for FileTemplateStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

fn sanitize(component: &str) -> String {
    component
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl TemplateStore for FileTemplateStore {
    fn save(&self, template: &PromptTemplate) -> Result<(), PromptError> {
        let path = self.path_for(template.name(), template.language());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to a sibling temp file first, then rename over the target
        let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, template)?;
            writer.flush()?;
        }
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(PromptError::StorageError(format!(
                "failed to move {:?} into place: {}",
                path, e
            )));
        }

        debug!("Saved template '{}' to {:?}", template.name(), path);
        Ok(())
    }

    fn load(&self, name: &str, language: &str) -> Result<Option<PromptTemplate>, PromptError> {
        let path = self.path_for(name, language);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<PromptTemplate>(&content) {
            Ok(template) => Ok(Some(template)),
            Err(e) => {
                warn!("Ignoring unreadable template cache {:?}: {}", path, e);
                Ok(None)
            }
        }
    }
}

/// Process-local store
pub struct InMemoryTemplateStore {
    templates: RwLock<HashMap<(String, String), PromptTemplate>>,
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn save(&self, template: &PromptTemplate) -> Result<(), PromptError> {
        self.templates.write().insert(
            (template.name().to_string(), template.language().to_string()),
            template.clone(),
        );
        Ok(())
    }

    fn load(&self, name: &str, language: &str) -> Result<Option<PromptTemplate>, PromptError> {
        Ok(self
            .templates
            .read()
            .get(&(name.to_string(), language.to_string()))
            .cloned())
    }
}
