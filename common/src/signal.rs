//! Canonical signal representation produced by every analysis stage

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an analysis branch. Its string form keys `Context.signals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Technical,
    Sentiment,
    Social,
}

impl SourceId {
    /// The three fan-out branches, in fusion order.
    pub const ANALYSIS: [SourceId; 3] = [SourceId::Technical, SourceId::Sentiment, SourceId::Social];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Technical => "technical",
            SourceId::Sentiment => "sentiment",
            SourceId::Social => "social",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional opinion: -1 bearish, 0 neutral, +1 bullish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Direction {
    Bearish,
    Neutral,
    Bullish,
}

impl Direction {
    pub fn value(self) -> i8 {
        match self {
            Direction::Bearish => -1,
            Direction::Neutral => 0,
            Direction::Bullish => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.value())
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
            Direction::Bullish => "bullish",
        }
    }
}

impl From<Direction> for i8 {
    fn from(direction: Direction) -> Self {
        direction.value()
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Direction::Bearish),
            0 => Ok(Direction::Neutral),
            1 => Ok(Direction::Bullish),
            other => Err(format!("direction must be -1, 0 or 1, got {}", other)),
        }
    }
}

/// A locally recovered normalization problem. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NormalizationFallback {
    /// No `signal`/`action` token at all
    MissingSignal,
    /// Token outside the known vocabulary, resolved to neutral
    UnknownToken(String),
    /// No confidence supplied, defaulted to 50%
    MissingConfidence,
    /// Confidence present but unreadable, defaulted to 50%
    UnparseableConfidence(String),
}

impl fmt::Display for NormalizationFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationFallback::MissingSignal => write!(f, "missing signal token, using neutral"),
            NormalizationFallback::UnknownToken(token) => {
                write!(f, "unrecognized signal token '{}', using neutral", token)
            }
            NormalizationFallback::MissingConfidence => write!(f, "missing confidence, using 50%"),
            NormalizationFallback::UnparseableConfidence(raw) => {
                write!(f, "unparseable confidence '{}', using 50%", raw)
            }
        }
    }
}

/// Canonical output of one analysis stage.
///
/// Fields are private so that the confidence bound holds for every record in
/// circulation; build one through [`SignalRecord::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    source_id: SourceId,
    direction: Direction,
    confidence: f64,
    #[serde(default)]
    raw_metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fallbacks: Vec<NormalizationFallback>,
    /// Set only by [`SignalRecord::degraded`]; never read from `raw_metadata`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    degraded: Option<String>,
}

impl SignalRecord {
    /// Neutral confidence used for fallbacks and degraded branches.
    pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

    /// Confidence is clamped to `[0, 1]`; a non-finite value becomes 0.5.
    pub fn new(
        source_id: SourceId,
        direction: Direction,
        confidence: f64,
        raw_metadata: serde_json::Value,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            Self::NEUTRAL_CONFIDENCE
        };

        Self {
            source_id,
            direction,
            confidence,
            raw_metadata,
            fallbacks: Vec::new(),
            degraded: None,
        }
    }

    /// Neutral stand-in for a branch that failed under the downgrade policy.
    pub fn degraded(source_id: SourceId, reason: &str) -> Self {
        let mut record = Self::new(
            source_id,
            Direction::Neutral,
            Self::NEUTRAL_CONFIDENCE,
            serde_json::json!({ "degraded": true, "reason": reason }),
        );
        record.degraded = Some(reason.to_string());
        record
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<NormalizationFallback>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn raw_metadata(&self) -> &serde_json::Value {
        &self.raw_metadata
    }

    pub fn fallbacks(&self) -> &[NormalizationFallback] {
        &self.fallbacks
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Failure reason recorded by [`SignalRecord::degraded`].
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_confidence_is_clamped() {
        let high = SignalRecord::new(SourceId::Technical, Direction::Bullish, 1.7, json!({}));
        assert_eq!(high.confidence(), 1.0);

        let low = SignalRecord::new(SourceId::Social, Direction::Bearish, -0.2, json!({}));
        assert_eq!(low.confidence(), 0.0);

        let nan = SignalRecord::new(SourceId::Sentiment, Direction::Neutral, f64::NAN, json!({}));
        assert_eq!(nan.confidence(), 0.5);
    }

    #[test]
    fn test_direction_serializes_as_integer() {
        assert_eq!(serde_json::to_value(Direction::Bearish).unwrap(), json!(-1));
        assert_eq!(serde_json::from_value::<Direction>(json!(1)).unwrap(), Direction::Bullish);
        assert!(serde_json::from_value::<Direction>(json!(2)).is_err());
    }

    #[test]
    fn test_degraded_record() {
        let record = SignalRecord::degraded(SourceId::Social, "timed out");
        assert_eq!(record.direction(), Direction::Neutral);
        assert_eq!(record.confidence(), 0.5);
        assert!(record.is_degraded());
        assert_eq!(record.degraded_reason(), Some("timed out"));
    }

    #[test]
    fn test_raw_blob_cannot_mark_itself_degraded() {
        let record = SignalRecord::new(
            SourceId::Sentiment,
            Direction::Bearish,
            0.6,
            json!({"signal": "bearish", "degraded": true, "reason": "feed said so"}),
        );
        assert!(!record.is_degraded());
        assert_eq!(record.degraded_reason(), None);
    }

    #[test]
    fn test_source_id_keys() {
        let keys: Vec<&str> = SourceId::ANALYSIS.iter().map(|s| s.as_str()).collect();
        assert_eq!(keys, vec!["technical", "sentiment", "social"]);
        assert_eq!(serde_json::to_value(SourceId::Social).unwrap(), json!("social"));
    }
}
