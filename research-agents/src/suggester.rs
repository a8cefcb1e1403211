//! Decision suggester - optional model-backed advisory stage
//!
//! A `DecisionSuggester` takes a structured prompt and answers with free text.
//! The answer is never trusted as-is: `parse_suggestion` strips markdown code
//! fences and extracts a JSON blob that the normalizer can read.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use common::{Portfolio, SignalRecord};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid code fence pattern");
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").expect("valid json object pattern");
}

const INSTRUCTIONS: &str = "Risk constraints are hard limits: never exceed max_position_margin and keep the given \
stop loss and take profit.\n\
Answer with a JSON object: {\"decision\": {\"action\": \"long\" | \"short\", \
\"confidence\": \"NN.N%\"}, \"reasoning\": \"...\"}\n";

/// One branch's normalized view, as shown to the suggester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSignal {
    pub source: String,
    pub signal: String,
    pub confidence: String,
    pub degraded: bool,
}

impl From<&SignalRecord> for PromptSignal {
    fn from(record: &SignalRecord) -> Self {
        Self {
            source: record.source_id().to_string(),
            signal: record.direction().label().to_string(),
            confidence: format!("{:.1}%", record.confidence() * 100.0),
            degraded: record.is_degraded(),
        }
    }
}

/// Everything the suggester is allowed to see
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionPrompt {
    pub crypto: String,
    pub signals: Vec<PromptSignal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_position_margin: Decimal,
    pub stop_loss: String,
    pub take_profit: String,
    pub portfolio: Portfolio,
}

impl SuggestionPrompt {
    /// Full prompt text: signals, hard constraints, then the expected answer shape
    pub fn render(&self) -> String {
        let mut out = format!("Decision review for {}.\n\nSignals:\n", self.crypto);
        for s in &self.signals {
            let _ = writeln!(
                out,
                "- {}: {} ({}){}",
                s.source,
                s.signal,
                s.confidence,
                if s.degraded { " [degraded]" } else { "" }
            );
        }
        let _ = write!(
            out,
            "\nRisk management:\n- max_position_margin: {}\n- stop_loss: {}\n- take_profit: {}\n\
             \nPortfolio:\n- cash: {:.2}\n- leverage: {:.2}\n- risk: {:.2}\n",
            self.max_position_margin,
            self.stop_loss,
            self.take_profit,
            self.portfolio.cash,
            self.portfolio.leverage,
            self.portfolio.risk_fraction,
        );
        out.push('\n');
        out.push_str(INSTRUCTIONS);
        out
    }
}

/// Model-backed (or scripted) advisor
#[async_trait]
pub trait DecisionSuggester: Send + Sync {
    fn name(&self) -> &str;

    async fn suggest(&self, prompt: &SuggestionPrompt) -> Result<String>;
}

/// Returns a fixed answer; stands in for a model in tests and offline runs
#[derive(Debug, Clone)]
pub struct StaticSuggester {
    response: String,
}

impl StaticSuggester {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl DecisionSuggester for StaticSuggester {
    fn name(&self) -> &str {
        "static"
    }

    async fn suggest(&self, _prompt: &SuggestionPrompt) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Free text -> the blob the normalizer reads.
///
/// A nested `decision` object (`{"decision": {"action": ..., "confidence": ...}}`)
/// is lifted to the top level, keeping `reasoning` when present.
pub fn parse_suggestion(text: &str) -> Result<Value> {
    let body = strip_code_fences(text);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            let candidate = JSON_OBJECT
                .find(body)
                .ok_or_else(|| anyhow!("suggestion contains no JSON object"))?;
            serde_json::from_str(candidate.as_str())?
        }
    };

    match value.get("decision") {
        Some(Value::Object(decision)) => {
            let mut lifted = decision.clone();
            if let Some(reasoning) = value.get("reasoning") {
                lifted.insert("reasoning".to_string(), reasoning.clone());
            }
            Ok(Value::Object(lifted))
        }
        _ if value.is_object() => Ok(value),
        _ => Err(anyhow!("suggestion is not a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Direction, SourceId};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn prompt() -> SuggestionPrompt {
        SuggestionPrompt {
            crypto: "BTC".to_string(),
            signals: vec![
                PromptSignal::from(&SignalRecord::new(SourceId::Technical, Direction::Bullish, 0.7, json!({}))),
                PromptSignal::from(&SignalRecord::degraded(SourceId::Social, "timeout")),
            ],
            max_position_margin: dec!(100000),
            stop_loss: "4.00%".to_string(),
            take_profit: "8.00%".to_string(),
            portfolio: Portfolio::default(),
        }
    }

    #[test]
    fn test_render_lists_signals_and_constraints() {
        let text = prompt().render();
        assert!(text.contains("- technical: bullish (70.0%)"));
        assert!(text.contains("- social: neutral (50.0%) [degraded]"));
        assert!(text.contains("max_position_margin: 100000"));
        assert!(text.contains("stop_loss: 4.00%"));
        assert!(text.contains("cash: 500000.00"));
        assert!(text.ends_with("\"reasoning\": \"...\"}\n"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_lifts_decision() {
        let text = "```json\n{\"decision\": {\"action\": \"long\", \"confidence\": \"56.5%\"}, \"reasoning\": \"ok\"}\n```";
        let blob = parse_suggestion(text).unwrap();
        assert_eq!(blob, json!({"action": "long", "confidence": "56.5%", "reasoning": "ok"}));
    }

    #[test]
    fn test_parse_finds_embedded_object() {
        let blob = parse_suggestion("Here you go: {\"signal\": \"sell\"} thanks").unwrap();
        assert_eq!(blob, json!({"signal": "sell"}));
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(parse_suggestion("I would go long").is_err());
        assert!(parse_suggestion("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn test_static_suggester() {
        let suggester = StaticSuggester::new("{\"signal\": \"buy\"}");
        assert_eq!(suggester.suggest(&prompt()).await.unwrap(), "{\"signal\": \"buy\"}");
    }
}
