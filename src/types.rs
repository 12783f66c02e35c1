//! Core signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trade direction carried by an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("buy") {
            Ok(Action::Buy)
        } else if s.eq_ignore_ascii_case("sell") {
            Ok(Action::Sell)
        } else {
            Err(())
        }
    }
}

/// A normalized TradingView alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: u64,
    pub action: Action,
    pub symbol: String,
    pub timeframe: String,
    pub price: Option<Decimal>,
    pub strategy: String,
    /// Time embedded in the alert, if any
    pub source_timestamp: Option<String>,
    /// Source timestamp when present, otherwise `received_at`
    pub timestamp: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    /// Client-reported processing time in milliseconds
    pub processing_time: Option<f64>,
    pub result: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub source: String,
    pub instrument: String,
}

impl Signal {
    /// Apply a completion callback. Returns false if already processed.
    pub fn complete(&mut self, record: &CompletionRecord) -> bool {
        if self.processed {
            return false;
        }
        self.processed = true;
        self.processing_time = record.processing_time;
        self.result = record.result.clone();
        self.completed_at = Some(record.completed_at);
        true
    }
}

/// Downstream "signal processed" callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub signal_id: u64,
    pub processing_time: Option<f64>,
    pub result: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn new(signal_id: u64, processing_time: Option<f64>, result: Option<String>) -> Self {
        Self {
            signal_id,
            processing_time,
            result,
            completed_at: Utc::now(),
        }
    }
}
