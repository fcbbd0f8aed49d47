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


//! # Ragscore Prompt Templates
//!
//! Named, versioned instructions with few-shot examples that render into
//! the final prompt sent to a judge model.
//!
//! A template declares the ordered `input_keys` it needs and the
//! `output_key` / `output_type` the model is expected to answer with.
//! Templates can be adapted (machine-translated) to another natural
//! language; the structural contract survives translation and adapted
//! copies are persisted through a [`TemplateStore`].
//!
//! ```rust,ignore
//! use ragscore_prompts::{OutputType, PromptExample, PromptTemplate};
//!
//! let template = PromptTemplate::new(
//!     "summary_check",
//!     "Decide if the summary is faithful to the text.",
//!     &["text", "summary"],
//!     "verdict",
//!     OutputType::Json,
//! )
//! .with_example(
//!     PromptExample::new(r#"{"faithful": true}"#)
//!         .with_input("text", "The sky is blue.")
//!         .with_input("summary", "Blue sky."),
//! );
//!
//! let prompt = template.render_with(&[("text", "..."), ("summary", "...")])?;
//! ```

pub mod store;

pub use store::{FileTemplateStore, InMemoryTemplateStore, TemplateStore};

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Language every built-in template is authored in.
pub const DEFAULT_LANGUAGE: &str = "english";

const JSON_OUTPUT_HINT: &str =
    "Respond only with valid JSON that follows the exact structure shown in the examples.";

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Missing input key: {0}")]
    MissingInputKey(String),
    #[error("Translation error: {0}")]
    Translation(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shape of the answer the model is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Json,
    String,
}

/// One worked example: ordered input values plus the expected output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExample {
    pub inputs: Vec<(String, String)>,
    pub output: String,
}

impl PromptExample {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.into(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.push((key.into(), value.into()));
        self
    }

    /// Value of an input field, if the example carries it
    pub fn input(&self, key: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Translates batches of text into a target natural language.
///
/// Implementations must return exactly one translation per input, in order.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, texts: Vec<String>, language: &str)
        -> Result<Vec<String>, PromptError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    name: String,
    version: Version,
    instruction: String,
    examples: Vec<PromptExample>,
    input_keys: Vec<String>,
    output_key: String,
    output_type: OutputType,
    #[serde(default = "default_language")]
    language: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        input_keys: &[&str],
        output_key: impl Into<String>,
        output_type: OutputType,
    ) -> Self {
        Self {
            name: name.into(),
            version: Version::new(1, 0, 0),
            instruction: instruction.into(),
            examples: Vec::new(),
            input_keys: input_keys.iter().map(|k| k.to_string()).collect(),
            output_key: output_key.into(),
            output_type,
            language: default_language(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_example(mut self, example: PromptExample) -> Self {
        self.examples.push(example);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn examples(&self) -> &[PromptExample] {
        &self.examples
    }

    pub fn input_keys(&self) -> &[String] {
        &self.input_keys
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Expected output of the first example, used as a schema hint when
    /// asking a model to repair malformed output
    pub fn format_hint(&self) -> Option<&str> {
        self.examples.first().map(|e| e.output.trim())
    }

    /// True when both templates promise the same inputs and output
    pub fn same_contract(&self, other: &PromptTemplate) -> bool {
        self.input_keys == other.input_keys
            && self.output_key == other.output_key
            && self.output_type == other.output_type
    }

    /// Render the final prompt.
    ///
    /// Fails with [`PromptError::MissingInputKey`] when any declared input
    /// key is absent from `fields`. Extra fields are ignored.
    pub fn render(&self, fields: &HashMap<String, String>) -> Result<String, PromptError> {
        let mut query = Vec::with_capacity(self.input_keys.len());
        for key in &self.input_keys {
            let value = fields
                .get(key)
                .ok_or_else(|| PromptError::MissingInputKey(key.clone()))?;
            query.push((key.as_str(), value.as_str()));
        }

        let mut prompt = String::new();
        prompt.push_str(self.instruction.trim());
        prompt.push('\n');
        if self.output_type == OutputType::Json {
            prompt.push_str(JSON_OUTPUT_HINT);
            prompt.push('\n');
        }

        if !self.examples.is_empty() {
            prompt.push_str("\nExamples:\n");
            for example in &self.examples {
                for (key, value) in &example.inputs {
                    prompt.push_str(&format!("\n{}: {}", key, value.trim()));
                }
                prompt.push_str(&self.format_output(&example.output));
                prompt.push('\n');
            }
        }

        prompt.push_str("\nYour actual task:\n");
        for (key, value) in query {
            prompt.push_str(&format!("\n{}: {}", key, value));
        }
        prompt.push_str(&format!("\n{}: \n", self.output_key));

        Ok(prompt)
    }

    /// Convenience wrapper around [`render`](Self::render) for borrowed pairs
    pub fn render_with(&self, fields: &[(&str, &str)]) -> Result<String, PromptError> {
        let fields: HashMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.render(&fields)
    }

    fn format_output(&self, output: &str) -> String {
        match self.output_type {
            OutputType::Json => format!("\n{}: ```{}```", self.output_key, output.trim()),
            OutputType::String => format!("\n{}: {}", self.output_key, output.trim()),
        }
    }

    /// Check that every example carries every input key and that JSON
    /// example outputs parse
    pub fn validate(&self) -> Result<(), PromptError> {
        for (i, example) in self.examples.iter().enumerate() {
            for key in &self.input_keys {
                if example.input(key).is_none() {
                    return Err(PromptError::ValidationError(format!(
                        "example {} of '{}' is missing input '{}'",
                        i, self.name, key
                    )));
                }
            }
            if self.output_type == OutputType::Json {
                serde_json::from_str::<Value>(example.output.trim()).map_err(|e| {
                    PromptError::ValidationError(format!(
                        "example {} of '{}' has invalid JSON output: {}",
                        i, self.name, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Produce a copy of this template in `language`.
    ///
    /// Returns a clone when the template already is in `language`, and the
    /// cached copy when `store` holds one for the same name and version.
    /// Otherwise the instruction and every example value are translated;
    /// key names and the input/output contract are left untouched. The
    /// result is not saved; call [`save`](Self::save) to persist it.
    pub async fn adapt(
        &self,
        language: &str,
        translator: &dyn Translator,
        store: &dyn TemplateStore,
    ) -> Result<PromptTemplate, PromptError> {
        let language = language.trim().to_lowercase();
        if language.is_empty() {
            return Err(PromptError::ValidationError(
                "target language must not be empty".to_string(),
            ));
        }
        if self.language == language {
            return Ok(self.clone());
        }

        if let Some(cached) = store.load(&self.name, &language)? {
            if cached.version == self.version && self.same_contract(&cached) {
                debug!("Using cached '{}' template for {}", self.name, language);
                return Ok(cached);
            }
            info!(
                "Cached '{}' template for {} is stale (version {}), re-adapting",
                self.name, language, cached.version
            );
        }

        info!("Adapting '{}' template to {}", self.name, language);

        let mut parsed_outputs = Vec::with_capacity(self.examples.len());
        let mut texts = vec![self.instruction.clone()];
        for example in &self.examples {
            texts.extend(example.inputs.iter().map(|(_, v)| v.clone()));
            match self.output_type {
                OutputType::Json => {
                    let value: Value = serde_json::from_str(example.output.trim())?;
                    collect_translatable(&value, &mut texts);
                    parsed_outputs.push(Some(value));
                }
                OutputType::String => {
                    texts.push(example.output.clone());
                    parsed_outputs.push(None);
                }
            }
        }

        let expected = texts.len();
        let translated = translator.translate(texts, &language).await?;
        if translated.len() != expected {
            return Err(PromptError::Translation(format!(
                "expected {} translations, got {}",
                expected,
                translated.len()
            )));
        }

        let mut translated = translated.into_iter();
        let instruction = translated.next().unwrap_or_default();
        let mut examples = Vec::with_capacity(self.examples.len());
        for (example, parsed) in self.examples.iter().zip(parsed_outputs) {
            let inputs = example
                .inputs
                .iter()
                .map(|(k, _)| (k.clone(), translated.next().unwrap_or_default()))
                .collect();
            let output = match parsed {
                Some(mut value) => {
                    replace_translatable(&mut value, &mut translated);
                    serde_json::to_string(&value)?
                }
                None => translated.next().unwrap_or_default(),
            };
            examples.push(PromptExample { inputs, output });
        }

        let adapted = PromptTemplate {
            name: self.name.clone(),
            version: self.version.clone(),
            instruction,
            examples,
            input_keys: self.input_keys.clone(),
            output_key: self.output_key.clone(),
            output_type: self.output_type,
            language,
        };
        adapted.validate()?;
        Ok(adapted)
    }

    /// Persist this template (language variant included)
    pub fn save(&self, store: &dyn TemplateStore) -> Result<(), PromptError> {
        store.save(self)
    }
}

/// Numbers, flags and labels such as `"1"` carry meaning for the scorer
/// and must come back verbatim.
fn is_translatable(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_err()
}

fn collect_translatable(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if is_translatable(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_translatable(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_translatable(item, out);
            }
        }
        _ => {}
    }
}

fn replace_translatable<I: Iterator<Item = String>>(value: &mut Value, translated: &mut I) {
    match value {
        Value::String(s) if is_translatable(s) => {
            if let Some(t) = translated.next() {
                *s = t;
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                replace_translatable(item, translated);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                replace_translatable(item, translated);
            }
        }
        _ => {}
    }
}
