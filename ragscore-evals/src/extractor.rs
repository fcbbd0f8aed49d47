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


//! Structured extraction of JSON records from free-text completions
//!
//! Completions are parsed strictly first. Anything that does not parse is
//! sent back to the judge model exactly once with a repair prompt; the
//! repaired text (and, failing that, the original) is then scanned for
//! embedded JSON. Extraction never returns an error: an unusable completion
//! becomes [`StructuredValue::Failure`].

use crate::llm_client::LLMClient;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::slice;
use std::sync::Arc;
use tracing::{debug, warn};

const JSON_REPAIR_PROMPT: &str = "Rewrite the input into valid JSON. Keep every field and value that is present, drop any surrounding text, and respond with the JSON only.";

/// Parsed form of one completion
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    Object(Map<String, Value>),
    List(Vec<Map<String, Value>>),
    Failure(String),
}

impl StructuredValue {
    /// Classify a parsed JSON value.
    ///
    /// Non-object elements of a list are dropped; a list holding only
    /// scalars, or a bare scalar, is a failure. An empty list stays a list.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => StructuredValue::Object(map),
            Value::Array(items) => {
                let total = items.len();
                let records: Vec<Map<String, Value>> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect();
                if records.is_empty() && total > 0 {
                    StructuredValue::Failure("list holds no JSON objects".to_string())
                } else {
                    StructuredValue::List(records)
                }
            }
            other => StructuredValue::Failure(format!("expected object or list, got {}", other)),
        }
    }

    /// Records carried by this value: one for an object, none for a failure
    pub fn records(&self) -> &[Map<String, Value>] {
        match self {
            StructuredValue::Object(map) => slice::from_ref(map),
            StructuredValue::List(records) => records,
            StructuredValue::Failure(_) => &[],
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StructuredValue::Failure(_))
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            StructuredValue::Failure(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Direct parse of the whole (trimmed) text
pub fn parse_strict(text: &str) -> Option<StructuredValue> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    match StructuredValue::from_value(value) {
        StructuredValue::Failure(_) => None,
        parsed => Some(parsed),
    }
}

/// Locate JSON embedded in prose or markdown fences.
///
/// A single embedded value is classified on its own. Several values are
/// merged into one list of their objects.
pub fn parse_lenient(text: &str) -> Option<StructuredValue> {
    if let Some(parsed) = parse_strict(text) {
        return Some(parsed);
    }

    let mut values = find_json_values(text);
    let parsed = match values.len() {
        0 => return None,
        1 => StructuredValue::from_value(values.remove(0)),
        _ => {
            let mut records = Vec::new();
            for value in values {
                records.extend(StructuredValue::from_value(value).records().iter().cloned());
            }
            if records.is_empty() {
                return None;
            }
            StructuredValue::List(records)
        }
    };

    match parsed {
        StructuredValue::Failure(_) => None,
        parsed => Some(parsed),
    }
}

/// Every balanced top-level `{...}` or `[...]` span that parses as JSON
pub fn find_json_values(text: &str) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut values = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'{' && bytes[pos] != b'[' {
            pos += 1;
            continue;
        }
        match balanced_end(bytes, pos) {
            Some(end) => match serde_json::from_str::<Value>(&text[pos..=end]) {
                Ok(value) => {
                    values.push(value);
                    pos = end + 1;
                }
                Err(_) => pos += 1,
            },
            None => pos += 1,
        }
    }

    values
}

/// Index of the bracket closing the one at `start`, skipping string literals
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(byte) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

/// Turns completions into [`StructuredValue`]s, repairing malformed output
/// with one extra model call
pub struct JsonExtractor {
    llm_client: Arc<dyn LLMClient>,
}

impl JsonExtractor {
    pub fn new(llm_client: Arc<dyn LLMClient>) -> Self {
        Self { llm_client }
    }

    fn repair_prompt(raw: &str, schema_hint: Option<&str>) -> String {
        let mut prompt = String::from(JSON_REPAIR_PROMPT);
        if let Some(hint) = schema_hint {
            prompt.push_str("\n\nExpected structure:\n");
            prompt.push_str(hint);
        }
        prompt.push_str("\n\nInput:\n");
        prompt.push_str(raw);
        prompt.push_str("\n\nJSON:\n");
        prompt
    }

    pub async fn extract(&self, raw: &str, schema_hint: Option<&str>) -> StructuredValue {
        if raw.trim().is_empty() {
            warn!("Structured extraction failed: empty completion");
            return StructuredValue::Failure("empty completion".to_string());
        }

        if let Some(parsed) = parse_strict(raw) {
            return parsed;
        }

        debug!("Completion is not valid JSON, requesting repair");
        let prompt = Self::repair_prompt(raw, schema_hint);
        let reason = match self.llm_client.generate(&[prompt], 1).await {
            Ok(generations) => {
                let repaired = generations.into_iter().flatten().next();
                match repaired.as_deref().and_then(parse_lenient) {
                    Some(parsed) => return parsed,
                    None => "repair produced no usable JSON".to_string(),
                }
            }
            Err(e) => format!("repair call failed: {}", e),
        };

        if let Some(parsed) = parse_lenient(raw) {
            debug!("Recovered JSON from original completion ({})", reason);
            return parsed;
        }

        warn!("Structured extraction failed: {}", reason);
        StructuredValue::Failure(reason)
    }

    /// Extract every completion of every prompt, keeping both orders.
    ///
    /// At most `max_concurrent` extractions (and so repair calls) are in
    /// flight at once.
    pub async fn extract_all(
        &self,
        generations: &[Vec<String>],
        schema_hint: Option<&str>,
        max_concurrent: usize,
    ) -> Vec<Vec<StructuredValue>> {
        let pending: Vec<_> = generations
            .iter()
            .flatten()
            .map(|completion| self.extract(completion, schema_hint))
            .collect();
        let mut values = stream::iter(pending)
            .buffered(max_concurrent.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter();

        generations
            .iter()
            .map(|completions| values.by_ref().take(completions.len()).collect())
            .collect()
    }
}
