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


//! Per-example scores with an explicit "undefined" state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Score for one example.
///
/// `Score::undefined()` marks an example that could not be scored (no
/// usable model output). It is never coerced to zero; it serialises as
/// JSON `null`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(Option<f64>);

impl Score {
    /// A NaN input becomes undefined
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(None)
        } else {
            Self(Some(value))
        }
    }

    pub const fn undefined() -> Self {
        Self(None)
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn is_undefined(&self) -> bool {
        self.0.is_none()
    }

    /// Value with undefined mapped to NaN, for numeric consumers
    pub fn to_f64(&self) -> f64 {
        self.0.unwrap_or(f64::NAN)
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{:.4}", value),
            None => write!(f, "undefined"),
        }
    }
}

/// Mean over the defined scores; undefined when none are defined
pub fn nan_mean(scores: &[Score]) -> Score {
    let defined: Vec<f64> = scores.iter().filter_map(Score::value).collect();
    if defined.is_empty() {
        return Score::undefined();
    }
    Score::new(defined.iter().sum::<f64>() / defined.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_becomes_undefined() {
        assert!(Score::new(f64::NAN).is_undefined());
        assert_eq!(Score::new(0.0).value(), Some(0.0));
        assert_ne!(Score::new(0.0), Score::undefined());
    }

    #[test]
    fn test_serialization() {
        assert_eq!(serde_json::to_string(&Score::new(0.5)).unwrap(), "0.5");
        assert_eq!(serde_json::to_string(&Score::undefined()).unwrap(), "null");
        let parsed: Score = serde_json::from_str("null").unwrap();
        assert!(parsed.is_undefined());
    }

    #[test]
    fn test_nan_mean_skips_undefined() {
        let scores = [Score::new(1.0), Score::undefined(), Score::new(0.0)];
        assert_eq!(nan_mean(&scores).value(), Some(0.5));
        assert!(nan_mean(&[Score::undefined()]).is_undefined());
        assert!(nan_mean(&[]).is_undefined());
    }

    #[test]
    fn test_display() {
        assert_eq!(Score::new(0.25).to_string(), "0.2500");
        assert_eq!(Score::undefined().to_string(), "undefined");
    }
}
