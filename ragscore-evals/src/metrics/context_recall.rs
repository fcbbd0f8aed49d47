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


//! Context recall: share of reference-answer statements supported by the
//! retrieved context
//!
//! The reference answer is split by the judge model into statements, each
//! classified as attributable to the context (`"1"`) or not (`"0"`).
//! Statements whose classification cannot be read still count in the
//! denominator.

use super::{EvaluationMode, Metric, MetricCore, MetricState};
use crate::config::EvalConfig;
use crate::dataset::{Dataset, CONTEXTS, GROUND_TRUTHS, QUESTION};
use crate::events::EventSink;
use crate::extractor::StructuredValue;
use crate::llm_client::LLMClient;
use crate::score::Score;
use crate::EvalError;
use async_trait::async_trait;
use ragscore_prompts::{OutputType, PromptExample, PromptTemplate, TemplateStore};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const NAME: &str = "context_recall";

const ATTRIBUTED_KEY: &str = "Attributed";

/// Default template: classify every reference statement against the context
pub fn context_recall_template() -> PromptTemplate {
    PromptTemplate::new(
        "context_recall",
        r#"Given a context, and an answer, analyze each sentence in the answer and classify if the sentence can be attributed to the given context or not. Use only "Yes" (1) or "No" (0) as a binary classification. Output json with reason."#,
        &["question", "context", "answer"],
        "classification",
        OutputType::Json,
    )
    .with_example(
        PromptExample::new(r#"[
    {
        "statement_1": "Albert Einstein, born on 14 March 1879, was a German-born theoretical physicist, widely held to be one of the greatest and most influential scientists of all time.",
        "reason": "The date of birth of Einstein is mentioned clearly in the context.",
        "Attributed": "1"
    },
    {
        "statement_2": "He received the 1921 Nobel Prize in Physics 'for his services to theoretical physics.",
        "reason": "The exact sentence is present in the given context.",
        "Attributed": "1"
    },
    {
        "statement_3": "He published 4 papers in 1905.",
        "reason": "There is no mention about papers he wrote in the given context.",
        "Attributed": "0"
    },
    {
        "statement_4": "Einstein moved to Switzerland in 1895.",
        "reason": "There is no supporting evidence for this in the given context.",
        "Attributed": "0"
    }
]"#)
        .with_input("question", "What can you tell me about albert Albert Einstein?")
        .with_input("context", "Albert Einstein (14 March 1879 – 18 April 1955) was a German-born theoretical physicist, widely held to be one of the greatest and most influential scientists of all time. Best known for developing the theory of relativity, he also made important contributions to quantum mechanics, and was thus a central figure in the revolutionary reshaping of the scientific understanding of nature that modern physics accomplished in the first decades of the twentieth century. His mass–energy equivalence formula E = mc2, which arises from relativity theory, has been called 'the world's most famous equation'. He received the 1921 Nobel Prize in Physics 'for his services to theoretical physics, and especially for his discovery of the law of the photoelectric effect', a pivotal step in the development of quantum theory. His work is also known for its influence on the philosophy of science. In a 1999 poll of 130 leading physicists worldwide by the British journal Physics World, Einstein was ranked the greatest physicist of all time. His intellectual achievements and originality have made Einstein synonymous with genius.")
        .with_input("answer", "Albert Einstein born in 14 March 1879 was  German-born theoretical physicist, widely held to be one of the greatest and most influential scientists of all time. He received the 1921 Nobel Prize in Physics for his services to theoretical physics. He published 4 papers in 1905.  Einstein moved to Switzerland in 1895"),
    )
    .with_example(
        PromptExample::new(r#"[
    {
        "statement_1": "England won the 2022 ICC Men's T20 World Cup.",
        "reason": "From context it is clear that England defeated Pakistan to win the World Cup.",
        "Attributed": "1"
    }
]"#)
        .with_input("question", "who won 2020 icc world cup?")
        .with_input("context", "Who won the 2022 ICC Men's T20 World Cup?")
        .with_input("answer", "England"),
    )
}

/// Judgment for one reference statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Attributed,
    NotAttributed,
    /// Field absent or not a recognisable 0/1
    Unresolved,
}

impl Attribution {
    pub fn classify(record: &Map<String, Value>) -> Self {
        match record.get(ATTRIBUTED_KEY) {
            Some(Value::String(s)) => match s.trim() {
                "1" => Attribution::Attributed,
                "0" => Attribution::NotAttributed,
                _ => Attribution::Unresolved,
            },
            Some(Value::Number(n)) => match n.as_i64() {
                Some(1) => Attribution::Attributed,
                Some(0) => Attribution::NotAttributed,
                _ => Attribution::Unresolved,
            },
            _ => Attribution::Unresolved,
        }
    }
}

/// Attributed statements over all statements; undefined with no statements
pub fn recall_score(value: &StructuredValue) -> Score {
    let records = value.records();
    if records.is_empty() {
        return Score::undefined();
    }

    let attributed = records
        .iter()
        .filter(|record| Attribution::classify(record) == Attribution::Attributed)
        .count();
    Score::new(attributed as f64 / records.len() as f64)
}

pub struct ContextRecall {
    core: MetricCore,
    template: PromptTemplate,
    batch_size: usize,
}

impl Default for ContextRecall {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRecall {
    pub fn new() -> Self {
        Self {
            core: MetricCore::new(NAME),
            template: context_recall_template(),
            batch_size: 15,
        }
    }

    pub fn from_config(config: &EvalConfig) -> Self {
        Self::new()
            .with_batch_size(config.batch_size)
            .with_max_concurrent(config.max_concurrent)
    }

    pub fn with_llm(mut self, llm_client: Arc<dyn LLMClient>) -> Self {
        self.core.bind_llm(llm_client);
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

    /// Upper bound on concurrent extractions, and so on repair calls
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
}

#[async_trait]
impl Metric for ContextRecall {
    fn name(&self) -> &str {
        NAME
    }

    fn evaluation_mode(&self) -> EvaluationMode {
        EvaluationMode::Qcg
    }

    fn state(&self) -> MetricState {
        self.core.state()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn sample_count(&self) -> usize {
        1
    }

    fn init_model(&mut self) -> Result<(), EvalError> {
        self.core.init_llm()?;
        self.core.mark_ready();
        Ok(())
    }

    async fn score_batch(&self, batch: &Dataset) -> Result<Vec<Score>, EvalError> {
        self.core.ensure_ready(self.state())?;
        self.evaluation_mode().validate(NAME, batch)?;

        let questions = batch.texts(QUESTION)?;
        let contexts = batch.texts(CONTEXTS)?;
        let ground_truths = batch.texts(GROUND_TRUTHS)?;
        self.core.start_batch(batch.len());

        // The reference answer fills the template's "answer" slot.
        let rows: Vec<HashMap<String, String>> = questions
            .into_iter()
            .zip(contexts)
            .zip(ground_truths)
            .map(|((question, context), answer)| {
                HashMap::from([
                    ("question".to_string(), question),
                    ("context".to_string(), context),
                    ("answer".to_string(), answer),
                ])
            })
            .collect();

        let samples = self
            .core
            .generate_records(&self.template, &rows, self.sample_count())
            .await?;

        let scores: Vec<Score> = samples
            .iter()
            .map(|row| row.first().map(recall_score).unwrap_or_default())
            .collect();

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Example, GroundTruth};
    use crate::metrics::testing::ScriptedLLM;
    use proptest::prelude::*;
    use ragscore_prompts::FileTemplateStore;
    use serde_json::json;

    fn example(question: &str, context: &str, ground_truths: &[&str]) -> Example {
        Example {
            question: Some(question.to_string()),
            contexts: Some(vec![context.to_string()]),
            ground_truths: Some(GroundTruth::Many(
                ground_truths.iter().map(|s| s.to_string()).collect(),
            )),
            ..Default::default()
        }
    }

    fn ready_metric(llm: Arc<ScriptedLLM>) -> ContextRecall {
        let mut metric = ContextRecall::new().with_llm(llm);
        metric.init_model().unwrap();
        metric
    }

    #[test]
    fn test_default_template_is_valid() {
        let template = context_recall_template();
        template.validate().unwrap();
        assert_eq!(template.output_key(), "classification");
        assert_eq!(template.input_keys(), &["question", "context", "answer"]);
    }

    #[test]
    fn test_classify() {
        let classify = |v: Value| Attribution::classify(v.as_object().unwrap());
        assert_eq!(classify(json!({"Attributed": "1"})), Attribution::Attributed);
        assert_eq!(classify(json!({"Attributed": " 0 "})), Attribution::NotAttributed);
        assert_eq!(classify(json!({"Attributed": 1})), Attribution::Attributed);
        assert_eq!(classify(json!({"Attributed": "Yes"})), Attribution::Unresolved);
        assert_eq!(classify(json!({"reason": "none"})), Attribution::Unresolved);
    }

    #[test]
    fn test_unresolved_statement_penalises() {
        let value = StructuredValue::from_value(json!([
            {"Attributed": "1"},
            {"Attributed": "maybe"},
        ]));
        assert_eq!(recall_score(&value), Score::new(0.5));
    }

    #[test]
    fn test_single_object_is_one_statement() {
        let value = StructuredValue::from_value(json!({"Attributed": "1"}));
        assert_eq!(recall_score(&value), Score::new(1.0));
    }

    #[test]
    fn test_empty_or_failed_is_undefined() {
        assert!(recall_score(&StructuredValue::List(vec![])).is_undefined());
        assert!(recall_score(&StructuredValue::Failure("x".to_string())).is_undefined());
    }

    #[tokio::test]
    async fn test_half_supported_reference_scores_half() {
        let llm = Arc::new(ScriptedLLM::new(
            &[],
            r#"[
                {"statement_1": "Einstein was born in 1879.", "reason": "stated", "Attributed": "1"},
                {"statement_2": "He won the 1921 Nobel Prize.", "reason": "stated", "Attributed": "1"},
                {"statement_3": "He published 4 papers in 1905.", "reason": "absent", "Attributed": "0"},
                {"statement_4": "He moved to Switzerland in 1895.", "reason": "absent", "Attributed": "0"}
            ]"#,
        ));
        let metric = ready_metric(llm.clone());

        let dataset = Dataset::from_rows(&[example(
            "What can you tell me about Albert Einstein?",
            "Albert Einstein (14 March 1879 – 18 April 1955) received the 1921 Nobel Prize.",
            &[
                "Einstein was born in 1879.",
                "He won the 1921 Nobel Prize.",
                "He published 4 papers in 1905.",
                "He moved to Switzerland in 1895.",
            ],
        )])
        .unwrap();

        let scores = metric.score_batch(&dataset).await.unwrap();
        assert_eq!(scores, vec![Score::new(0.5)]);
        assert_eq!(*llm.sample_counts.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_reference_fills_answer_slot() {
        let llm = Arc::new(ScriptedLLM::new(
            &[("answer: England\nIn 2022", r#"[{"Attributed": "1"}]"#)],
            r#"[{"Attributed": "0"}]"#,
        ));
        let metric = ready_metric(llm);

        let dataset = Dataset::from_rows(&[
            example("who won?", "England won the final.", &["England", "In 2022"]),
            example("who lost?", "Pakistan lost.", &["Pakistan"]),
        ])
        .unwrap();

        let scores = metric.score_batch(&dataset).await.unwrap();
        assert_eq!(scores, vec![Score::new(1.0), Score::new(0.0)]);
    }

    #[tokio::test]
    async fn test_unparseable_classification_is_undefined() {
        let llm = Arc::new(ScriptedLLM::new(&[], "I could not classify these."));
        let metric = ready_metric(llm);

        let dataset =
            Dataset::from_rows(&[example("q", "c", &["a statement"])]).unwrap();
        let scores = metric.score_batch(&dataset).await.unwrap();
        assert!(scores[0].is_undefined());
    }

    #[tokio::test]
    async fn test_missing_ground_truths_column() {
        let llm = Arc::new(ScriptedLLM::new(&[], "[]"));
        let metric = ready_metric(llm.clone());

        let mut row = example("q", "c", &["a"]);
        row.ground_truths = None;
        let dataset = Dataset::from_rows(&[row]).unwrap();

        assert!(matches!(
            metric.score(&dataset).await,
            Err(EvalError::MissingColumn { .. })
        ));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_config_concurrency_bounds_extraction() {
        let config = EvalConfig {
            max_concurrent: 1,
            ..Default::default()
        };
        let llm = Arc::new(ScriptedLLM::new(&[], "Attributed: yes"));
        let mut metric = ContextRecall::from_config(&config).with_llm(llm.clone());
        metric.init_model().unwrap();
        assert_eq!(metric.core.max_concurrent(), 1);

        let dataset = Dataset::from_rows(&[
            example("q1", "c1", &["a"]),
            example("q2", "c2", &["b"]),
        ])
        .unwrap();
        let scores = metric.score_batch(&dataset).await.unwrap();

        assert!(scores.iter().all(Score::is_undefined));
        // one generation call plus one repair per row
        assert_eq!(llm.calls(), 3);
    }

    #[test]
    fn test_init_without_llm_is_not_ready() {
        let mut metric = ContextRecall::new();
        assert!(matches!(metric.init_model(), Err(EvalError::NotReady(_))));
        assert_eq!(metric.state(), MetricState::Uninitialized);
    }

    #[test]
    fn test_init_with_missing_key() {
        let mut metric =
            ContextRecall::new().with_llm(Arc::new(ScriptedLLM::new(&[], "[]").without_key()));
        assert!(matches!(
            metric.init_model(),
            Err(EvalError::MissingCredential(_))
        ));
        assert_eq!(metric.state(), MetricState::ModelBound);
    }

    #[test]
    fn test_save_persists_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTemplateStore::new(dir.path());
        let metric = ContextRecall::new();
        metric.save(&store).unwrap();

        let loaded = store.load("context_recall", "english").unwrap().unwrap();
        assert_eq!(loaded.input_keys(), metric.template().input_keys());
        assert_eq!(loaded.output_key(), "classification");
        assert_eq!(loaded.output_type(), OutputType::Json);
    }

    proptest! {
        #[test]
        fn prop_recall_is_bounded(labels in prop::collection::vec(0u8..3, 1..20)) {
            let records: Vec<Value> = labels
                .iter()
                .map(|l| match l {
                    0 => json!({"Attributed": "0"}),
                    1 => json!({"Attributed": "1"}),
                    _ => json!({"Attributed": null}),
                })
                .collect();
            let attributed = labels.iter().filter(|l| **l == 1).count();

            let score = recall_score(&StructuredValue::from_value(Value::Array(records)))
                .value()
                .unwrap();
            prop_assert!((0.0..=1.0).contains(&score));
            prop_assert!((score - attributed as f64 / labels.len() as f64).abs() < 1e-12);
        }
    }
}
