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


//! # Ragscore Evaluation Engine
//!
//! LLM-judged metrics for retrieval-augmented generation.
//!
//! Every metric follows the same pipeline: render a prompt template per
//! example, sample completions from a judge model in one batched call,
//! extract JSON records from the completions, and aggregate them into one
//! score per example. Unusable model output never aborts a batch; it turns
//! into an undefined score.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ragscore_evals::llm_client::OpenAIClient;
//! use ragscore_evals::metrics::{AnswerRelevancy, ContextRecall, Metric};
//! use ragscore_evals::{evaluate, Dataset};
//! use std::sync::Arc;
//!
//! let client = Arc::new(OpenAIClient::new(
//!     std::env::var("OPENAI_API_KEY")?,
//!     "gpt-4o-mini".to_string(),
//! ));
//! let mut metrics: Vec<Box<dyn Metric>> = vec![
//!     Box::new(AnswerRelevancy::new().with_llm(client.clone()).with_embeddings(client.clone())),
//!     Box::new(ContextRecall::new().with_llm(client)),
//! ];
//!
//! let report = evaluate(&Dataset::from_rows(&rows)?, &mut metrics).await?;
//! println!("{}", report);
//! ```

use thiserror::Error;

pub mod config;
pub mod dataset;
pub mod evaluate;
pub mod events;
pub mod extractor;
pub mod llm_client;
pub mod metrics;
pub mod score;

pub use config::EvalConfig;
pub use dataset::{Column, Dataset, DatasetError, Example, GroundTruth};
pub use evaluate::{evaluate, EvaluationReport};
pub use events::{EvalEvent, EventSink, RecordingSink, TracingSink};
pub use extractor::{JsonExtractor, StructuredValue};
pub use llm_client::{EmbedError, EmbeddingClient, LLMClient, LLMError, OpenAIClient};
pub use metrics::{AnswerRelevancy, ContextRecall, EvaluationMode, Metric, MetricState};
pub use score::{nan_mean, Score};

use ragscore_prompts::PromptError;

/// Evaluation errors
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Metric '{metric}' requires column '{column}'")]
    MissingColumn { metric: String, column: String },

    #[error("Metric not ready: {0}")]
    NotReady(String),

    #[error("LLM client error: {0}")]
    LLMClientError(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LLMError> for EvalError {
    fn from(err: LLMError) -> Self {
        if err.is_credential_error() {
            EvalError::MissingCredential(err.to_string())
        } else {
            EvalError::LLMClientError(err.to_string())
        }
    }
}

impl From<EmbedError> for EvalError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::MissingCredential(_) | EmbedError::InvalidCredential(_) => {
                EvalError::MissingCredential(err.to_string())
            }
            other => EvalError::Embedding(other.to_string()),
        }
    }
}
