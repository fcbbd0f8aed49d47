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


//! Answer relevancy: how well an answer addresses its question
//!
//! The judge model reverse-engineers `strictness` questions from each
//! answer. The score is the mean cosine similarity between the real
//! question and the generated ones. An answer flagged as noncommittal by
//! any sample scores exactly 0.

use super::formulas::mean_cosine_similarity;
use super::{EvaluationMode, Metric, MetricCore, MetricState};
use crate::config::EvalConfig;
use crate::dataset::{Dataset, ANSWER, CONTEXTS, QUESTION};
use crate::events::EventSink;
use crate::extractor::StructuredValue;
use crate::llm_client::{EmbeddingClient, LLMClient};
use crate::score::Score;
use crate::EvalError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use ragscore_prompts::{OutputType, PromptExample, PromptTemplate, TemplateStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "answer_relevancy";

/// Default template: generate a question for an answer and flag evasive
/// answers
pub fn question_generation() -> PromptTemplate {
    PromptTemplate::new(
        "question_generation",
        "Generate a question for the given answer and Identify if answer is noncommittal",
        &["answer", "context"],
        "output",
        OutputType::Json,
    )
    .with_example(
        PromptExample::new(r#"{"question":"Where was Albert Einstein born?","noncommittal":false}"#)
            .with_input("answer", "Albert Einstein was born in Germany.")
            .with_input("context", "Albert Einstein was a German-born theoretical physicist who is widely held to be one of the greatest and most influential scientists of all time"),
    )
    .with_example(
        PromptExample::new(r#"{"question":"What unique ability does the newly discovered species of frog have?","noncommittal":false}"#)
            .with_input("answer", "It can change its skin color based on the temperature of its environment.")
            .with_input("context", "A recent scientific study has discovered a new species of frog in the Amazon rainforest that has the unique ability to change its skin color based on the temperature of its environment."),
    )
    .with_example(
        PromptExample::new(r#"{"question":"What is the tallest mountain on Earth?","noncommittal":false}"#)
            .with_input("answer", "Everest")
            .with_input("context", "The tallest mountain on Earth, measured from sea level, is a renowned peak located in the Himalayas."),
    )
    .with_example(
        PromptExample::new(r#"{"question":"What was the groundbreaking feature of the smartphone invented in 2023?", "noncommittal":true}"#)
            .with_input("answer", "I don't know about the  groundbreaking feature of the smartphone invented in 2023 as am unware of information beyond 2022. ")
            .with_input("context", "In 2023, a groundbreaking invention was announced: a smartphone with a battery life of one month, revolutionizing the way people use mobile technology."),
    )
}

/// Questions and noncommittal flag gathered from one example's samples
#[derive(Debug, Default, PartialEq)]
pub struct GeneratedQuestions {
    pub questions: Vec<String>,
    pub noncommittal: bool,
}

/// Collect generated questions across all samples of one example.
///
/// Records without a non-blank string `question` contribute no question;
/// failed samples contribute nothing at all.
pub fn collect_generated(samples: &[StructuredValue]) -> GeneratedQuestions {
    let mut generated = GeneratedQuestions::default();
    for record in samples.iter().flat_map(StructuredValue::records) {
        if record.get("noncommittal").is_some_and(is_truthy) {
            generated.noncommittal = true;
        }
        if let Some(Value::String(question)) = record.get("question") {
            if !question.trim().is_empty() {
                generated.questions.push(question.clone());
            }
        }
    }
    generated
}

/// Loose boolean reading of a model-produced flag
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

pub struct AnswerRelevancy {
    core: MetricCore,
    embeddings: Option<Arc<dyn EmbeddingClient>>,
    template: PromptTemplate,
    batch_size: usize,
    strictness: usize,
}

impl Default for AnswerRelevancy {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerRelevancy {
    pub fn new() -> Self {
        Self {
            core: MetricCore::new(NAME),
            embeddings: None,
            template: question_generation(),
            batch_size: 15,
            strictness: 3,
        }
    }

    /// Apply batch size, strictness and concurrency from `config`
    pub fn from_config(config: &EvalConfig) -> Self {
        Self::new()
            .with_batch_size(config.batch_size)
            .with_strictness(config.strictness)
            .with_max_concurrent(config.max_concurrent)
    }

    pub fn with_llm(mut self, llm_client: Arc<dyn LLMClient>) -> Self {
        self.core.bind_llm(llm_client);
        self
    }

    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of questions generated per answer. 3 to 5 works well.
    pub fn with_strictness(mut self, strictness: usize) -> Self {
        self.strictness = strictness.max(1);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.core.set_max_concurrent(max_concurrent);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.core.set_event_sink(events);
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    fn embeddings(&self) -> Result<&Arc<dyn EmbeddingClient>, EvalError> {
        self.embeddings
            .as_ref()
            .ok_or_else(|| EvalError::NotReady(format!("{} has no embedding client bound", NAME)))
    }

    async fn score_example(
        &self,
        question: &str,
        samples: &[StructuredValue],
    ) -> Result<Score, EvalError> {
        let generated = collect_generated(samples);
        if generated.noncommittal {
            return Ok(Score::new(0.0));
        }
        if generated.questions.is_empty() {
            debug!("No generated questions for '{}'", question);
            return Ok(Score::undefined());
        }

        let embeddings = self.embeddings()?;
        let question_vec = embeddings.embed_query(question).await?;
        let generated_vecs = embeddings.embed_documents(&generated.questions).await?;
        if generated_vecs.len() != generated.questions.len() {
            return Err(EvalError::Embedding(format!(
                "expected {} document vectors, got {}",
                generated.questions.len(),
                generated_vecs.len()
            )));
        }

        mean_cosine_similarity(&question_vec, &generated_vecs)
            .map(Score::new)
            .ok_or_else(|| {
                EvalError::Embedding(format!(
                    "embeddings are empty, zero or not {}-dimensional",
                    question_vec.len()
                ))
            })
    }
}

#[async_trait]
impl Metric for AnswerRelevancy {
    fn name(&self) -> &str {
        NAME
    }

    fn evaluation_mode(&self) -> EvaluationMode {
        EvaluationMode::Qac
    }

    fn state(&self) -> MetricState {
        if self.embeddings.is_none() {
            MetricState::Uninitialized
        } else {
            self.core.state()
        }
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn sample_count(&self) -> usize {
        self.strictness
    }

    fn init_model(&mut self) -> Result<(), EvalError> {
        if self.state() == MetricState::Uninitialized {
            return Err(EvalError::NotReady(format!(
                "{} needs an LLM and an embedding client",
                NAME
            )));
        }
        self.core.init_llm()?;
        self.embeddings()?.validate_credentials()?;
        self.core.mark_ready();
        Ok(())
    }

    async fn score_batch(&self, batch: &Dataset) -> Result<Vec<Score>, EvalError> {
        self.core.ensure_ready(self.state())?;
        self.evaluation_mode().validate(NAME, batch)?;

        let questions = batch.texts(QUESTION)?;
        let answers = batch.texts(ANSWER)?;
        let contexts = batch.texts(CONTEXTS)?;
        self.core.start_batch(batch.len());

        let rows: Vec<HashMap<String, String>> = answers
            .into_iter()
            .zip(contexts)
            .map(|(answer, context)| {
                HashMap::from([
                    ("answer".to_string(), answer),
                    ("context".to_string(), context),
                ])
            })
            .collect();

        let samples = self
            .core
            .generate_records(&self.template, &rows, self.sample_count())
            .await?;

        let pending: Vec<_> = questions
            .iter()
            .zip(samples.iter())
            .map(|(question, samples)| self.score_example(question, samples))
            .collect();
        let scores: Vec<Score> = stream::iter(pending)
            .buffered(self.core.max_concurrent())
            .try_collect()
            .await?;

        self.core.finish_batch(&scores);
        Ok(scores)
    }

    async fn adapt(&mut self, language: &str, store: &dyn TemplateStore) -> Result<(), EvalError> {
        self.template = self
            .core
            .adapt_template(&self.template, language, store)
            .await?;
        Ok(())
    }

    fn save(&self, store: &dyn TemplateStore) -> Result<(), EvalError> {
        Ok(self.template.save(store)?)
    }
}
