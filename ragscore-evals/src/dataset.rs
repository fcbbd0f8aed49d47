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


//! Ordered, columnar row-set holding evaluation examples and derived scores

use crate::score::Score;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use thiserror::Error;

pub const QUESTION: &str = "question";
pub const ANSWER: &str = "answer";
pub const CONTEXTS: &str = "contexts";
pub const GROUND_TRUTHS: &str = "ground_truths";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Row {row} has no value for column '{column}'")]
    MissingValue { column: String, row: usize },

    #[error("Column '{0}' does not hold text")]
    NotText(String),

    #[error("Column '{0}' does not hold scores")]
    NotScores(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Text(Vec<String>),
    TextList(Vec<Vec<String>>),
    Score(Vec<Score>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Text(values) => values.len(),
            Column::TextList(values) => values.len(),
            Column::Score(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slice(&self, range: Range<usize>) -> Column {
        match self {
            Column::Text(values) => Column::Text(values[range].to_vec()),
            Column::TextList(values) => Column::TextList(values[range].to_vec()),
            Column::Score(values) => Column::Score(values[range].to_vec()),
        }
    }
}

/// Columns keep insertion order; every column has `len()` rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<(String, Column)>,
    len: usize,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, DatasetError> {
        self.insert_column(name, column)?;
        Ok(self)
    }

    /// Insert or replace a column. The first column fixes the row count.
    pub fn insert_column(&mut self, name: &str, column: Column) -> Result<(), DatasetError> {
        let replacing_only = self.columns.len() == 1 && self.columns[0].0 == name;
        if self.columns.is_empty() || replacing_only {
            self.len = column.len();
        } else if column.len() != self.len {
            return Err(DatasetError::LengthMismatch {
                column: name.to_string(),
                expected: self.len,
                actual: column.len(),
            });
        }

        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = column,
            None => self.columns.push((name.to_string(), column)),
        }
        Ok(())
    }

    /// Attach a derived score column without touching row order
    pub fn add_scores(&mut self, name: &str, scores: Vec<Score>) -> Result<(), DatasetError> {
        self.insert_column(name, Column::Score(scores))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn column(&self, name: &str) -> Result<&Column, DatasetError> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
    }

    /// One string per row; list cells are joined with newlines
    pub fn texts(&self, name: &str) -> Result<Vec<String>, DatasetError> {
        match self.column(name)? {
            Column::Text(values) => Ok(values.clone()),
            Column::TextList(values) => Ok(values.iter().map(|v| v.join("\n")).collect()),
            Column::Score(_) => Err(DatasetError::NotText(name.to_string())),
        }
    }

    pub fn scores(&self, name: &str) -> Result<&[Score], DatasetError> {
        match self.column(name)? {
            Column::Score(values) => Ok(values),
            _ => Err(DatasetError::NotScores(name.to_string())),
        }
    }

    /// Owned copy of consecutive rows. `range` is clamped to the row count.
    pub fn slice(&self, range: Range<usize>) -> Dataset {
        let end = range.end.min(self.len);
        let start = range.start.min(end);
        Dataset {
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.slice(start..end)))
                .collect(),
            len: end - start,
        }
    }

    /// Build columns from rows. A field becomes a column only when every
    /// row carries it; partial presence is an error.
    pub fn from_rows(rows: &[Example]) -> Result<Self, DatasetError> {
        let mut dataset = Dataset::new();
        if rows.is_empty() {
            return Ok(dataset);
        }

        if let Some(values) = collect_field(rows, QUESTION, |r| r.question.clone())? {
            dataset.insert_column(QUESTION, Column::Text(values))?;
        }
        if let Some(values) = collect_field(rows, ANSWER, |r| r.answer.clone())? {
            dataset.insert_column(ANSWER, Column::Text(values))?;
        }
        if let Some(values) = collect_field(rows, CONTEXTS, |r| r.contexts.clone())? {
            dataset.insert_column(CONTEXTS, Column::TextList(values))?;
        }
        if let Some(values) = collect_field(rows, GROUND_TRUTHS, |r| r.ground_truths.clone())? {
            let column = if values.iter().all(|v| matches!(v, GroundTruth::Single(_))) {
                Column::Text(values.into_iter().map(GroundTruth::into_joined).collect())
            } else {
                Column::TextList(values.into_iter().map(GroundTruth::into_list).collect())
            };
            dataset.insert_column(GROUND_TRUTHS, column)?;
        }

        let mut score_names: Vec<&String> = rows.iter().flat_map(|r| r.scores.keys()).collect();
        score_names.sort();
        score_names.dedup();
        for name in score_names {
            let scores = rows
                .iter()
                .map(|r| r.scores.get(name).copied().unwrap_or_default())
                .collect();
            dataset.add_scores(name, scores)?;
        }

        Ok(dataset)
    }

    pub fn to_rows(&self) -> Vec<Example> {
        let mut rows = vec![Example::default(); self.len];
        for (name, column) in &self.columns {
            for (i, row) in rows.iter_mut().enumerate() {
                match (name.as_str(), column) {
                    (QUESTION, Column::Text(v)) => row.question = Some(v[i].clone()),
                    (ANSWER, Column::Text(v)) => row.answer = Some(v[i].clone()),
                    (CONTEXTS, Column::TextList(v)) => row.contexts = Some(v[i].clone()),
                    (CONTEXTS, Column::Text(v)) => row.contexts = Some(vec![v[i].clone()]),
                    (GROUND_TRUTHS, Column::Text(v)) => {
                        row.ground_truths = Some(GroundTruth::Single(v[i].clone()))
                    }
                    (GROUND_TRUTHS, Column::TextList(v)) => {
                        row.ground_truths = Some(GroundTruth::Many(v[i].clone()))
                    }
                    (_, Column::Score(v)) => {
                        row.scores.insert(name.clone(), v[i]);
                    }
                    _ => {}
                }
            }
        }
        rows
    }
}

fn collect_field<T>(
    rows: &[Example],
    column: &str,
    get: impl Fn(&Example) -> Option<T>,
) -> Result<Option<Vec<T>>, DatasetError> {
    let values: Vec<Option<T>> = rows.iter().map(get).collect();
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| DatasetError::MissingValue {
                column: column.to_string(),
                row,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Reference answer: a single string or a list of statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroundTruth {
    Single(String),
    Many(Vec<String>),
}

impl GroundTruth {
    pub fn into_joined(self) -> String {
        match self {
            GroundTruth::Single(s) => s,
            GroundTruth::Many(v) => v.join("\n"),
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            GroundTruth::Single(s) => vec![s],
            GroundTruth::Many(v) => v,
        }
    }
}

/// One row of evaluation input, plus any scores attached to it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Example {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,

    #[serde(default, alias = "ground_truth", skip_serializing_if = "Option::is_none")]
    pub ground_truths: Option<GroundTruth>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<String, Score>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Example> {
        vec![
            Example {
                question: Some("Where was Einstein born?".to_string()),
                answer: Some("Germany".to_string()),
                contexts: Some(vec!["Einstein was born in Ulm.".to_string(), "Ulm is in Germany.".to_string()]),
                ground_truths: Some(GroundTruth::Single("Ulm, Germany".to_string())),
                ..Default::default()
            },
            Example {
                question: Some("Who won?".to_string()),
                answer: Some("England".to_string()),
                contexts: Some(vec!["England won the final.".to_string()]),
                ground_truths: Some(GroundTruth::Many(vec!["England".to_string(), "In 2022".to_string()])),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn test_from_rows_builds_columns() {
        let dataset = Dataset::from_rows(&rows()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.has_column(QUESTION));
        assert_eq!(
            dataset.texts(CONTEXTS).unwrap()[0],
            "Einstein was born in Ulm.\nUlm is in Germany."
        );
        assert_eq!(dataset.texts(GROUND_TRUTHS).unwrap()[1], "England\nIn 2022");
        assert!(matches!(dataset.column(GROUND_TRUTHS).unwrap(), Column::TextList(_)));
    }

    #[test]
    fn test_partial_field_is_rejected() {
        let mut rows = rows();
        rows[1].answer = None;
        let err = Dataset::from_rows(&rows).unwrap_err();
        assert!(matches!(err, DatasetError::MissingValue { row: 1, .. }));
    }

    #[test]
    fn test_absent_field_has_no_column() {
        let mut rows = rows();
        for row in &mut rows {
            row.ground_truths = None;
        }
        let dataset = Dataset::from_rows(&rows).unwrap();
        assert!(matches!(
            dataset.column(GROUND_TRUTHS),
            Err(DatasetError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_add_scores_checks_length() {
        let mut dataset = Dataset::from_rows(&rows()).unwrap();
        assert!(matches!(
            dataset.add_scores("answer_relevancy", vec![Score::new(1.0)]),
            Err(DatasetError::LengthMismatch { expected: 2, actual: 1, .. })
        ));

        dataset
            .add_scores("answer_relevancy", vec![Score::new(1.0), Score::undefined()])
            .unwrap();
        assert_eq!(
            dataset.scores("answer_relevancy").unwrap(),
            &[Score::new(1.0), Score::undefined()]
        );
    }

    #[test]
    fn test_slice() {
        let dataset = Dataset::from_rows(&rows()).unwrap();
        let batch = dataset.slice(1..5);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.texts(ANSWER).unwrap(), vec!["England"]);
    }

    #[test]
    fn test_rows_round_trip_with_scores() {
        let mut dataset = Dataset::from_rows(&rows()).unwrap();
        dataset
            .add_scores("context_recall", vec![Score::new(0.5), Score::undefined()])
            .unwrap();

        let out = dataset.to_rows();
        assert_eq!(out[0].scores["context_recall"], Score::new(0.5));
        assert_eq!(out[1].ground_truths, rows()[1].ground_truths);

        let json = serde_json::to_string(&out).unwrap();
        let parsed: Vec<Example> = serde_json::from_str(&json).unwrap();
        assert_eq!(Dataset::from_rows(&parsed).unwrap(), dataset);
    }

    #[test]
    fn test_scores_nest_under_scores_key() {
        let mut dataset = Dataset::from_rows(&rows()[..1]).unwrap();
        dataset
            .add_scores("context_recall", vec![Score::undefined()])
            .unwrap();

        let json = serde_json::to_value(&dataset.to_rows()[0]).unwrap();
        assert!(json["scores"]["context_recall"].is_null());
        assert!(json.get("context_recall").is_none());

        let unscored = serde_json::to_value(&rows()[0]).unwrap();
        assert!(unscored.get("scores").is_none());
    }

    #[test]
    fn test_ground_truth_alias() {
        let row: Example =
            serde_json::from_str(r#"{"question": "q", "ground_truth": "a"}"#).unwrap();
        assert_eq!(row.ground_truths, Some(GroundTruth::Single("a".to_string())));
    }
}
