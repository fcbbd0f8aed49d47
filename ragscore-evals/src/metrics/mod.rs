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


//! Metric contract shared by every LLM-judged metric
//!
//! A metric moves through three states: it starts `Uninitialized`, becomes
//! `ModelBound` once its clients are attached, and `Ready` after
//! [`Metric::init_model`] has validated their credentials. Only a ready
//! metric scores.

pub mod answer_relevancy;
pub mod context_recall;
pub mod formulas;

pub use answer_relevancy::AnswerRelevancy;
pub use context_recall::{Attribution, ContextRecall};

use crate::dataset::{Dataset, ANSWER, CONTEXTS, GROUND_TRUTHS, QUESTION};
use crate::events::{EvalEvent, EventSink, TracingSink};
use crate::extractor::{JsonExtractor, StructuredValue};
use crate::llm_client::{LLMClient, LlmTranslator};
use crate::score::Score;
use crate::EvalError;
use async_trait::async_trait;
use ragscore_prompts::{PromptTemplate, TemplateStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Column subset a metric needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// question, answer, contexts
    Qac,
    Qa,
    Qc,
    /// ground_truths, contexts
    Gc,
    Ga,
    Qga,
    /// question, contexts, ground_truths
    Qcg,
}

impl EvaluationMode {
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            EvaluationMode::Qac => &[QUESTION, ANSWER, CONTEXTS],
            EvaluationMode::Qa => &[QUESTION, ANSWER],
            EvaluationMode::Qc => &[QUESTION, CONTEXTS],
            EvaluationMode::Gc => &[GROUND_TRUTHS, CONTEXTS],
            EvaluationMode::Ga => &[GROUND_TRUTHS, ANSWER],
            EvaluationMode::Qga => &[QUESTION, GROUND_TRUTHS, ANSWER],
            EvaluationMode::Qcg => &[QUESTION, CONTEXTS, GROUND_TRUTHS],
        }
    }

    /// Fails on the first required column the dataset lacks
    pub fn validate(&self, metric: &str, dataset: &Dataset) -> Result<(), EvalError> {
        match self
            .required_columns()
            .iter()
            .find(|column| !dataset.has_column(column))
        {
            Some(column) => Err(EvalError::MissingColumn {
                metric: metric.to_string(),
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricState {
    Uninitialized,
    ModelBound,
    Ready,
}

/// An LLM-judged metric producing one score per dataset row
#[async_trait]
pub trait Metric: Send + Sync {
    /// Name of the score column this metric produces
    fn name(&self) -> &str;

    fn evaluation_mode(&self) -> EvaluationMode;

    fn state(&self) -> MetricState;

    fn batch_size(&self) -> usize;

    /// Completions requested per prompt
    fn sample_count(&self) -> usize;

    /// Validate credentials of the bound clients and become `Ready`
    fn init_model(&mut self) -> Result<(), EvalError>;

    /// Score one batch; the result is aligned with the batch rows
    async fn score_batch(&self, batch: &Dataset) -> Result<Vec<Score>, EvalError>;

    /// Translate the metric's prompt template into `language`
    async fn adapt(&mut self, language: &str, store: &dyn TemplateStore) -> Result<(), EvalError>;

    fn save(&self, store: &dyn TemplateStore) -> Result<(), EvalError>;

    /// Score the whole dataset in `batch_size` chunks and attach the result
    /// as a column named after the metric
    async fn score(&self, dataset: &Dataset) -> Result<Dataset, EvalError> {
        let mut scored = dataset.clone();
        if dataset.is_empty() {
            scored.add_scores(self.name(), Vec::new())?;
            return Ok(scored);
        }
        self.evaluation_mode().validate(self.name(), dataset)?;

        let batch_size = self.batch_size().max(1);
        let mut scores = Vec::with_capacity(dataset.len());
        let mut start = 0;
        while start < dataset.len() {
            let batch = dataset.slice(start..start + batch_size);
            let batch_scores = self.score_batch(&batch).await?;
            if batch_scores.len() != batch.len() {
                return Err(EvalError::Internal(format!(
                    "{} returned {} scores for {} rows",
                    self.name(),
                    batch_scores.len(),
                    batch.len()
                )));
            }
            scores.extend(batch_scores);
            start += batch.len();
        }

        scored.add_scores(self.name(), scores)?;
        Ok(scored)
    }
}

/// State and plumbing shared by the concrete metrics
pub struct MetricCore {
    name: String,
    ready: bool,
    llm_client: Option<Arc<dyn LLMClient>>,
    extractor: Option<JsonExtractor>,
    events: Arc<dyn EventSink>,
    max_concurrent: usize,
}

impl MetricCore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ready: false,
            llm_client: None,
            extractor: None,
            events: Arc::new(TracingSink),
            max_concurrent: 10,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a judge model. A newly bound client must be initialised again.
    pub fn bind_llm(&mut self, llm_client: Arc<dyn LLMClient>) {
        self.extractor = Some(JsonExtractor::new(llm_client.clone()));
        self.llm_client = Some(llm_client);
        self.ready = false;
    }

    pub fn set_event_sink(&mut self, events: Arc<dyn EventSink>) {
        self.events = events;
    }

    pub fn set_max_concurrent(&mut self, max_concurrent: usize) {
        self.max_concurrent = max_concurrent.max(1);
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn state(&self) -> MetricState {
        match (&self.llm_client, self.ready) {
            (None, _) => MetricState::Uninitialized,
            (Some(_), false) => MetricState::ModelBound,
            (Some(_), true) => MetricState::Ready,
        }
    }

    pub fn llm(&self) -> Result<&Arc<dyn LLMClient>, EvalError> {
        self.llm_client
            .as_ref()
            .ok_or_else(|| EvalError::NotReady(format!("{} has no LLM bound", self.name)))
    }

    /// Validate the judge model's credentials
    pub fn init_llm(&self) -> Result<(), EvalError> {
        self.llm()?.validate_credentials()?;
        Ok(())
    }

    pub fn mark_ready(&mut self) {
        if self.llm_client.is_some() {
            self.ready = true;
        }
    }

    pub fn ensure_ready(&self, state: MetricState) -> Result<(), EvalError> {
        if state == MetricState::Ready {
            Ok(())
        } else {
            Err(EvalError::NotReady(format!(
                "{} is {:?}; call init_model first",
                self.name, state
            )))
        }
    }

    pub fn emit(&self, event: EvalEvent) {
        self.events.emit(&event);
    }

    /// Translate `template` with the bound model, consulting `store` first
    pub async fn adapt_template(
        &self,
        template: &PromptTemplate,
        language: &str,
        store: &dyn TemplateStore,
    ) -> Result<PromptTemplate, EvalError> {
        info!("Adapting {} to {}", self.name, language);
        let translator = LlmTranslator::new(self.llm()?.clone());
        Ok(template.adapt(language, &translator, store).await?)
    }

    /// Render one prompt per row, request `n` completions for each in one
    /// call, and extract every completion.
    ///
    /// The outer result is aligned with `rows`; each inner vector holds the
    /// `n` extracted completions for that row.
    pub async fn generate_records(
        &self,
        template: &PromptTemplate,
        rows: &[HashMap<String, String>],
        n: usize,
    ) -> Result<Vec<Vec<StructuredValue>>, EvalError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut prompts = Vec::with_capacity(rows.len());
        for (row, fields) in rows.iter().enumerate() {
            prompts.push(template.render(fields)?);
            self.emit(EvalEvent::PromptRendered {
                metric: self.name.clone(),
                row,
            });
        }

        let generations = self.llm()?.generate(&prompts, n).await?;
        if generations.len() != prompts.len() {
            return Err(EvalError::LLMClientError(format!(
                "expected completions for {} prompts, got {}",
                prompts.len(),
                generations.len()
            )));
        }

        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| EvalError::NotReady(format!("{} has no LLM bound", self.name)))?;
        Ok(extractor
            .extract_all(&generations, template.format_hint(), self.max_concurrent)
            .await)
    }

    pub fn start_batch(&self, rows: usize) {
        self.emit(EvalEvent::BatchStarted {
            metric: self.name.clone(),
            rows,
        });
    }

    pub fn finish_batch(&self, scores: &[Score]) {
        for (row, score) in scores.iter().enumerate() {
            self.emit(EvalEvent::ExampleScored {
                metric: self.name.clone(),
                row,
                score: *score,
            });
        }
        self.emit(EvalEvent::BatchFinished {
            metric: self.name.clone(),
            rows: scores.len(),
            undefined: scores.iter().filter(|s| s.is_undefined()).count(),
        });
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    #[test]
    fn test_mode_validation_names_first_missing_column() {
        let dataset = Dataset::new()
            .with_column(QUESTION, Column::Text(vec!["q".to_string()]))
            .unwrap();

        let err = EvaluationMode::Qcg
            .validate("context_recall", &dataset)
            .unwrap_err();
        match err {
            EvalError::MissingColumn { metric, column } => {
                assert_eq!(metric, "context_recall");
                assert_eq!(column, CONTEXTS);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(EvaluationMode::Qc.validate("m", &dataset).is_err());
        let dataset = dataset
            .with_column(CONTEXTS, Column::TextList(vec![vec!["c".to_string()]]))
            .unwrap();
        assert!(EvaluationMode::Qc.validate("m", &dataset).is_ok());
    }

    #[tokio::test]
    async fn test_score_empty_dataset_without_model_calls() {
        let llm = Arc::new(testing::ScriptedLLM::new(&[], "[]"));
        let mut metric = ContextRecall::new().with_llm(llm.clone());
        metric.init_model().unwrap();

        let scored = metric.score(&Dataset::from_rows(&[]).unwrap()).await.unwrap();
        assert!(scored.is_empty());
        assert!(scored.scores("context_recall").unwrap().is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_core_state_transitions() {
        let mut core = MetricCore::new("m");
        assert_eq!(core.state(), MetricState::Uninitialized);
        core.mark_ready();
        assert_eq!(core.state(), MetricState::Uninitialized);

        core.bind_llm(Arc::new(testing::ScriptedLLM::new(&[], "{}")));
        assert_eq!(core.state(), MetricState::ModelBound);
        core.mark_ready();
        assert_eq!(core.state(), MetricState::Ready);

        core.bind_llm(Arc::new(testing::ScriptedLLM::new(&[], "{}")));
        assert_eq!(core.state(), MetricState::ModelBound);
    }
}
