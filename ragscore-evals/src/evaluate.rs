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


//! Run several metrics over one dataset

use crate::dataset::Dataset;
use crate::metrics::{Metric, MetricState};
use crate::score::{nan_mean, Score};
use crate::EvalError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Scored dataset plus the mean of every metric over its defined scores
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub dataset: Dataset,
    pub summary: BTreeMap<String, Score>,
}

#[derive(Serialize)]
struct SummaryView<'a> {
    summary: &'a BTreeMap<String, Score>,
    rows: usize,
}

impl EvaluationReport {
    pub fn summary_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&SummaryView {
            summary: &self.summary,
            rows: self.dataset.len(),
        })
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (metric, score) in &self.summary {
            writeln!(f, "{}: {}", metric, score)?;
        }
        Ok(())
    }
}

/// Initialise every metric that is not ready yet, then score the dataset
/// with each in turn.
///
/// All column requirements are checked before any model call.
pub async fn evaluate(
    dataset: &Dataset,
    metrics: &mut [Box<dyn Metric>],
) -> Result<EvaluationReport, EvalError> {
    if metrics.is_empty() {
        return Err(EvalError::InvalidInput("no metrics to evaluate".to_string()));
    }

    if dataset.is_empty() {
        let mut scored = dataset.clone();
        let mut summary = BTreeMap::new();
        for metric in metrics.iter() {
            scored.add_scores(metric.name(), Vec::new())?;
            summary.insert(metric.name().to_string(), Score::undefined());
        }
        return Ok(EvaluationReport {
            dataset: scored,
            summary,
        });
    }

    for metric in metrics.iter() {
        metric.evaluation_mode().validate(metric.name(), dataset)?;
    }
    for metric in metrics.iter_mut() {
        if metric.state() != MetricState::Ready {
            metric.init_model()?;
        }
    }

    let mut scored = dataset.clone();
    let mut summary = BTreeMap::new();
    for metric in metrics.iter() {
        info!("Evaluating {} on {} rows", metric.name(), dataset.len());
        let result = metric.score(dataset).await?;
        let scores = result.scores(metric.name())?.to_vec();
        summary.insert(metric.name().to_string(), nan_mean(&scores));
        scored.add_scores(metric.name(), scores)?;
    }

    Ok(EvaluationReport {
        dataset: scored,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Example, GroundTruth};
    use crate::metrics::testing::{ScriptedLLM, TableEmbeddings};
    use crate::metrics::{AnswerRelevancy, ContextRecall};
    use std::sync::Arc;

    fn dataset() -> Dataset {
        Dataset::from_rows(&[
            Example {
                question: Some("Where was Einstein born?".to_string()),
                answer: Some("Ulm".to_string()),
                contexts: Some(vec!["Einstein was born in Ulm.".to_string()]),
                ground_truths: Some(GroundTruth::Single("Ulm, Germany".to_string())),
                ..Default::default()
            },
            Example {
                question: Some("Who won?".to_string()),
                answer: Some("Not sure".to_string()),
                contexts: Some(vec!["England won.".to_string()]),
                ground_truths: Some(GroundTruth::Single("England".to_string())),
                ..Default::default()
            },
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_evaluate_attaches_every_metric() {
        let llm = Arc::new(ScriptedLLM::new(
            &[
                ("answer: Ulm, Germany", r#"[{"Attributed": "1"}, {"Attributed": "0"}]"#),
                ("answer: Ulm", r#"{"question": "Where was Einstein born?", "noncommittal": false}"#),
                ("answer: Not sure", r#"{"question": "Who won?", "noncommittal": true}"#),
                ("answer: England", r#"[{"Attributed": "1"}]"#),
            ],
            "nothing",
        ));
        let embeddings = Arc::new(TableEmbeddings::new(&[], vec![1.0, 1.0]));

        let mut metrics: Vec<Box<dyn Metric>> = vec![
            Box::new(
                AnswerRelevancy::new()
                    .with_llm(llm.clone())
                    .with_embeddings(embeddings),
            ),
            Box::new(ContextRecall::new().with_llm(llm)),
        ];

        let report = evaluate(&dataset(), &mut metrics).await.unwrap();

        let relevancy = report.dataset.scores("answer_relevancy").unwrap();
        assert!((relevancy[0].value().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(relevancy[1], Score::new(0.0));

        let recall = report.dataset.scores("context_recall").unwrap();
        assert_eq!(recall, &[Score::new(0.5), Score::new(1.0)]);
        assert_eq!(report.summary["context_recall"], Score::new(0.75));
        assert!(metrics.iter().all(|m| m.state() == MetricState::Ready));
        assert!(report.to_string().contains("context_recall: 0.7500"));
    }

    #[tokio::test]
    async fn test_evaluate_checks_columns_before_init() {
        let mut metrics: Vec<Box<dyn Metric>> = vec![Box::new(
            ContextRecall::new().with_llm(Arc::new(ScriptedLLM::new(&[], "[]").without_key())),
        )];
        let dataset = Dataset::from_rows(&[Example {
            question: Some("q".to_string()),
            ..Default::default()
        }])
        .unwrap();

        let err = evaluate(&dataset, &mut metrics).await.unwrap_err();
        assert!(matches!(err, EvalError::MissingColumn { .. }));
    }

    #[tokio::test]
    async fn test_evaluate_empty_dataset() {
        let llm = Arc::new(ScriptedLLM::new(&[], "[]").without_key());
        let mut metrics: Vec<Box<dyn Metric>> = vec![Box::new(ContextRecall::new().with_llm(llm.clone()))];

        let report = evaluate(&Dataset::from_rows(&[]).unwrap(), &mut metrics)
            .await
            .unwrap();

        assert!(report.dataset.scores("context_recall").unwrap().is_empty());
        assert!(report.summary["context_recall"].is_undefined());
        assert!(report.dataset.to_rows().is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_evaluate_requires_metrics() {
        let err = evaluate(&dataset(), &mut []).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }
}
