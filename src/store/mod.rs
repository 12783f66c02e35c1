//! In-memory signal store
//!
//! Holds the process-scoped state: the id counter, the current signal and a
//! bounded most-recent-first history. Every mutation happens inside a single
//! write section so ids, current and history always agree.

#[cfg(test)]
mod tests;

use crate::config::IngestorConfig;
use crate::error::{RelayError, Result, ValidationError};
use crate::parser::ParsedAlert;
use crate::types::{Action, CompletionRecord, Signal};
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;

/// History entries returned when no usable limit is given
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

const SIGNAL_SOURCE: &str = "tradingview";

/// Alert that passed validation but has not been committed yet
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAlert {
    pub symbol: String,
    pub action: Action,
    pub timeframe: Option<String>,
    pub price: Option<Decimal>,
    pub strategy: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug)]
struct StoreState {
    next_id: u64,
    current: Option<Signal>,
    history: VecDeque<Signal>,
    accepted: u64,
}

/// Store counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub history_len: usize,
    pub capacity: usize,
    pub accepted: u64,
    pub next_id: u64,
}

pub struct SignalStore {
    state: RwLock<StoreState>,
    capacity: usize,
    require_timeframe: bool,
    default_timeframe: String,
    default_strategy: String,
    instrument: String,
}

impl SignalStore {
    pub fn new(config: &IngestorConfig) -> Self {
        let capacity = config.history_capacity.max(1);
        Self {
            state: RwLock::new(StoreState {
                next_id: config.first_signal_id,
                current: None,
                history: VecDeque::with_capacity(capacity + 1),
                accepted: 0,
            }),
            capacity,
            require_timeframe: config.require_timeframe,
            default_timeframe: config.default_timeframe.clone(),
            default_strategy: config.default_strategy.clone(),
            instrument: config.instrument.clone(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fields an alert must carry to be stored
    pub fn required_fields(&self) -> Vec<String> {
        let mut required = vec!["action".to_string(), "symbol".to_string()];
        if self.require_timeframe {
            required.push("timeframe".to_string());
        }
        required
    }

    /// Check required fields without touching any state
    pub fn validate(&self, alert: ParsedAlert) -> std::result::Result<ValidatedAlert, ValidationError> {
        let required = self.required_fields();

        let invalid: Vec<String> = alert
            .invalid
            .iter()
            .filter(|f| required.contains(f))
            .cloned()
            .collect();

        let missing: Vec<String> = required
            .iter()
            .filter(|field| !invalid.contains(field))
            .filter(|field| match field.as_str() {
                "action" => alert.action.is_none(),
                "symbol" => alert.symbol.is_none(),
                "timeframe" => alert.timeframe.is_none(),
                _ => false,
            })
            .cloned()
            .collect();

        match (alert.action, alert.symbol) {
            (Some(action), Some(symbol)) if missing.is_empty() && invalid.is_empty() => {
                Ok(ValidatedAlert {
                    symbol,
                    action,
                    timeframe: alert.timeframe,
                    price: alert.price,
                    strategy: alert.strategy,
                    timestamp: alert.timestamp,
                })
            }
            _ => Err(ValidationError {
                required,
                missing,
                invalid,
                received: alert.received,
            }),
        }
    }

    /// Assign the next id and record the signal as current and newest history entry.
    ///
    /// Fails without touching state once the id counter cannot advance.
    pub fn commit(&self, alert: ValidatedAlert) -> Result<Signal> {
        let received_at = Utc::now();
        let mut state = self.state.write();

        let id = state.next_id;
        state.next_id = id
            .checked_add(1)
            .ok_or_else(|| RelayError::Internal(format!("signal id space exhausted at {}", id)))?;
        state.accepted += 1;

        let signal = Signal {
            id,
            action: alert.action,
            symbol: alert.symbol.to_uppercase(),
            timeframe: alert
                .timeframe
                .unwrap_or_else(|| self.default_timeframe.clone()),
            price: alert.price,
            strategy: alert
                .strategy
                .unwrap_or_else(|| self.default_strategy.clone()),
            timestamp: alert
                .timestamp
                .clone()
                .unwrap_or_else(|| received_at.to_rfc3339()),
            source_timestamp: alert.timestamp,
            received_at,
            processed: false,
            processing_time: None,
            result: None,
            completed_at: None,
            source: SIGNAL_SOURCE.to_string(),
            instrument: self.instrument.clone(),
        };

        state.current = Some(signal.clone());
        state.history.push_front(signal.clone());
        state.history.truncate(self.capacity);

        Ok(signal)
    }

    /// Validate then commit
    pub fn ingest(&self, alert: ParsedAlert) -> Result<Signal> {
        let validated = self.validate(alert)?;
        self.commit(validated)
    }

    pub fn current(&self) -> Option<Signal> {
        self.state.read().current.clone()
    }

    /// Newest `limit` signals, most recent first. Non-positive or absent limit means 10.
    pub fn history(&self, limit: Option<i64>) -> Vec<Signal> {
        let limit = match limit {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_HISTORY_LIMIT,
        };
        self.state.read().history.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget the current signal; history is untouched
    pub fn clear_current(&self) -> Option<Signal> {
        self.state.write().current.take()
    }

    /// Record completion on the current signal if its id matches.
    ///
    /// The history entry with the same id is updated alongside. Returns the
    /// applied record, or `None` when nothing matched or the signal was
    /// already processed.
    pub fn mark_processed(
        &self,
        id: u64,
        processing_time: Option<f64>,
        result: Option<String>,
    ) -> Option<CompletionRecord> {
        let record = CompletionRecord::new(id, processing_time, result);
        let mut state = self.state.write();

        let current = state.current.as_mut().filter(|s| s.id == id)?;
        if !current.complete(&record) {
            return None;
        }
        if let Some(entry) = state.history.iter_mut().find(|s| s.id == id) {
            entry.complete(&record);
        }

        Some(record)
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            history_len: state.history.len(),
            capacity: self.capacity,
            accepted: state.accepted,
            next_id: state.next_id,
        }
    }
}
