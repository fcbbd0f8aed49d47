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


//! Progress events emitted while metrics score a dataset

use crate::score::Score;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

/// Row indices are relative to the batch being scored
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EvalEvent {
    BatchStarted { metric: String, rows: usize },
    PromptRendered { metric: String, row: usize },
    ExampleScored { metric: String, row: usize, score: Score },
    BatchFinished { metric: String, rows: usize, undefined: usize },
}

/// Observer for evaluation progress. Scoring never depends on a sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EvalEvent);
}

/// Default sink: forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &EvalEvent) {
        match event {
            EvalEvent::BatchStarted { metric, rows } => {
                info!("{}: scoring batch of {} rows", metric, rows)
            }
            EvalEvent::PromptRendered { metric, row } => {
                debug!("{}: rendered prompt for row {}", metric, row)
            }
            EvalEvent::ExampleScored { metric, row, score } => {
                debug!("{}: row {} scored {}", metric, row, score)
            }
            EvalEvent::BatchFinished {
                metric,
                rows,
                undefined,
            } => info!(
                "{}: finished batch of {} rows ({} undefined)",
                metric, rows, undefined
            ),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EvalEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EvalEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &EvalEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(&EvalEvent::BatchStarted {
            metric: "context_recall".to_string(),
            rows: 1,
        });
        sink.emit(&EvalEvent::ExampleScored {
            metric: "context_recall".to_string(),
            row: 0,
            score: Score::new(0.5),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], EvalEvent::ExampleScored { row: 0, .. }));
    }

    #[test]
    fn test_event_serialises_with_tag() {
        let event = EvalEvent::ExampleScored {
            metric: "answer_relevancy".to_string(),
            row: 3,
            score: Score::undefined(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "example_scored");
        assert!(json["score"].is_null());
    }
}
