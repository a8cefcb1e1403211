//! Signal Normalizer - raw stage output to canonical `SignalRecord`
//!
//! Stages speak a loose dialect: `signal` (or `action`) tokens in any case,
//! confidence as `"73%"`, `"73.5 %"`, `"73"` or a bare JSON number. Anything
//! unreadable falls back to neutral / 50% and is recorded, never raised.

use crate::fusion::Advisory;
use common::{Direction, NormalizationFallback, SignalRecord, SourceId};
use serde_json::Value;
use tracing::{debug, warn};

const BULLISH_TOKENS: [&str; 3] = ["bullish", "buy", "long"];
const BEARISH_TOKENS: [&str; 3] = ["bearish", "sell", "short"];

/// Map a direction token; `None` for tokens outside the vocabulary
pub fn parse_direction(token: &str) -> Option<Direction> {
    let token = token.trim().to_ascii_lowercase();
    if BULLISH_TOKENS.contains(&token.as_str()) {
        Some(Direction::Bullish)
    } else if BEARISH_TOKENS.contains(&token.as_str()) {
        Some(Direction::Bearish)
    } else if token == "neutral" || token == "hold" {
        Some(Direction::Neutral)
    } else {
        None
    }
}

/// Read a confidence value as a fraction in `[0, 1]`.
///
/// Strings are percentages. JSON numbers up to 1.0 are fractions, larger
/// numbers are percentages.
pub fn parse_confidence(value: &Value) -> Option<f64> {
    let fraction = match value {
        Value::String(s) => {
            let s = s.trim();
            let s = s.strip_suffix('%').unwrap_or(s).trim_end();
            s.parse::<f64>().ok()? / 100.0
        }
        Value::Number(n) => {
            let n = n.as_f64()?;
            if n <= 1.0 {
                n
            } else {
                n / 100.0
            }
        }
        _ => return None,
    };

    fraction.is_finite().then(|| fraction.clamp(0.0, 1.0))
}

/// Canonicalize a stage's raw blob. The blob is kept as `raw_metadata`.
pub fn normalize(source: SourceId, raw: &Value) -> SignalRecord {
    let (direction, confidence, fallbacks) = read_blob(source.as_str(), raw);
    SignalRecord::new(source, direction, confidence, raw.clone()).with_fallbacks(fallbacks)
}

/// Canonicalize a parsed suggester answer
pub fn normalize_advisory(suggester: &str, raw: &Value) -> Advisory {
    let (direction, confidence, fallbacks) = read_blob(suggester, raw);
    Advisory {
        suggester: suggester.to_string(),
        direction,
        confidence,
        raw: raw.clone(),
        fallbacks,
    }
}

fn read_blob(origin: &str, raw: &Value) -> (Direction, f64, Vec<NormalizationFallback>) {
    let token = raw.get("signal").or_else(|| raw.get("action"));
    let parts = normalize_parts(token, raw.get("confidence"));

    for fallback in &parts.2 {
        match fallback {
            NormalizationFallback::UnknownToken(_) | NormalizationFallback::UnparseableConfidence(_) => {
                warn!(origin, %fallback, "Normalization fallback")
            }
            _ => debug!(origin, %fallback, "Normalization fallback"),
        }
    }
    parts
}

/// Token + confidence -> `(direction, confidence, fallbacks)`
pub fn normalize_parts(
    token: Option<&Value>,
    confidence: Option<&Value>,
) -> (Direction, f64, Vec<NormalizationFallback>) {
    let mut fallbacks = Vec::new();

    let direction = match token {
        None | Some(Value::Null) => {
            fallbacks.push(NormalizationFallback::MissingSignal);
            Direction::Neutral
        }
        Some(Value::String(s)) => parse_direction(s).unwrap_or_else(|| {
            fallbacks.push(NormalizationFallback::UnknownToken(s.clone()));
            Direction::Neutral
        }),
        Some(other) => {
            fallbacks.push(NormalizationFallback::UnknownToken(other.to_string()));
            Direction::Neutral
        }
    };

    let confidence = match confidence {
        None | Some(Value::Null) => {
            fallbacks.push(NormalizationFallback::MissingConfidence);
            SignalRecord::NEUTRAL_CONFIDENCE
        }
        Some(value) => parse_confidence(value).unwrap_or_else(|| {
            let raw = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            fallbacks.push(NormalizationFallback::UnparseableConfidence(raw));
            SignalRecord::NEUTRAL_CONFIDENCE
        }),
    };

    (direction, confidence, fallbacks)
}
