//! Request-scoped context accumulated by the scheduler
//!
//! Stages never touch the `Context` directly. Each returns a `ContextDelta`
//! and the scheduler merges them; merging is a key-disjoint union, so the
//! order fan-out branches finish in does not matter.

use common::{DateRange, MarketSnapshot, PipelineError, Portfolio, SignalRecord, SourceId, Uuid};
use portfolio_risk::RiskProfile;
use serde::Serialize;
use std::collections::BTreeMap;

/// Output of one stage, keyed by what it fills
#[derive(Debug, Clone)]
pub enum ContextDelta {
    Signal(SignalRecord),
    Risk(RiskProfile),
}

impl ContextDelta {
    fn key(&self) -> String {
        match self {
            ContextDelta::Signal(record) => format!("signals.{}", record.source_id()),
            ContextDelta::Risk(_) => "risk_profile".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Context {
    pub request_id: Uuid,
    pub crypto: String,
    pub date_range: DateRange,
    pub portfolio: Portfolio,
    signals: BTreeMap<SourceId, SignalRecord>,
    risk_profile: Option<RiskProfile>,
}

impl Context {
    pub fn new(request_id: Uuid, snapshot: &MarketSnapshot, portfolio: Portfolio) -> Self {
        Self {
            request_id,
            crypto: snapshot.crypto.clone(),
            date_range: snapshot.range,
            portfolio,
            signals: BTreeMap::new(),
            risk_profile: None,
        }
    }

    /// Apply one delta; writing a key twice is an error
    pub fn apply(&mut self, delta: ContextDelta) -> Result<(), PipelineError> {
        let key = delta.key();
        let occupied = match delta {
            ContextDelta::Signal(record) => {
                let source = record.source_id();
                if self.signals.contains_key(&source) {
                    true
                } else {
                    self.signals.insert(source, record);
                    false
                }
            }
            ContextDelta::Risk(profile) => {
                if self.risk_profile.is_some() {
                    true
                } else {
                    self.risk_profile = Some(profile);
                    false
                }
            }
        };

        if occupied {
            return Err(PipelineError::InvalidGraph(format!("{} written twice", key)));
        }
        Ok(())
    }

    /// Merge a batch of deltas; nothing is applied if any key collides
    pub fn merge(&mut self, deltas: Vec<ContextDelta>) -> Result<(), PipelineError> {
        let mut staged = self.clone();
        for delta in deltas {
            staged.apply(delta)?;
        }
        *self = staged;
        Ok(())
    }

    pub fn signal(&self, source: SourceId) -> Option<&SignalRecord> {
        self.signals.get(&source)
    }

    pub fn signals(&self) -> &BTreeMap<SourceId, SignalRecord> {
        &self.signals
    }

    pub fn risk_profile(&self) -> Option<&RiskProfile> {
        self.risk_profile.as_ref()
    }

    /// Branches replaced by a neutral record, in fusion order
    pub fn degraded(&self) -> Vec<SourceId> {
        self.signals
            .values()
            .filter(|record| record.is_degraded())
            .map(|record| record.source_id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::{Direction, LongShort};
    use serde_json::json;

    fn context() -> Context {
        let snapshot = MarketSnapshot {
            crypto: "BTC".to_string(),
            range: DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            },
            candles: vec![],
            long_short: LongShort { long: 1.0, short: 1.0 },
        };
        Context::new(Uuid::new_v4(), &snapshot, Portfolio::default())
    }

    fn record(source: SourceId, direction: Direction) -> SignalRecord {
        SignalRecord::new(source, direction, 0.7, json!({}))
    }

    #[test]
    fn test_merge_is_order_independent() {
        let deltas = vec![
            ContextDelta::Signal(record(SourceId::Technical, Direction::Bullish)),
            ContextDelta::Signal(record(SourceId::Sentiment, Direction::Bearish)),
            ContextDelta::Signal(SignalRecord::degraded(SourceId::Social, "timeout")),
        ];
        let mut reversed = deltas.clone();
        reversed.reverse();

        let mut a = context();
        let mut b = a.clone();
        a.merge(deltas).unwrap();
        b.merge(reversed).unwrap();

        assert_eq!(a.signals(), b.signals());
        assert_eq!(a.degraded(), vec![SourceId::Social]);
    }

    #[test]
    fn test_duplicate_key_rejected_atomically() {
        let mut ctx = context();
        let result = ctx.merge(vec![
            ContextDelta::Signal(record(SourceId::Technical, Direction::Bullish)),
            ContextDelta::Signal(record(SourceId::Technical, Direction::Bearish)),
        ]);
        assert!(matches!(result, Err(PipelineError::InvalidGraph(_))));
        assert!(ctx.signals().is_empty());
    }

    #[test]
    fn test_risk_written_once() {
        let base = chrono::Utc::now();
        let candles: Vec<common::Candle> = (0..10)
            .map(|i| common::Candle {
                time: base + chrono::Duration::days(i),
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0 + i as f64,
                volume: 0.0,
            })
            .collect();
        let profile = portfolio_risk::RiskEvaluator::default()
            .evaluate(&Portfolio::default(), &candles)
            .unwrap();

        let mut ctx = context();
        ctx.apply(ContextDelta::Risk(profile.clone())).unwrap();
        assert_eq!(ctx.risk_profile(), Some(&profile));
        assert!(ctx.apply(ContextDelta::Risk(profile)).is_err());
    }
}
