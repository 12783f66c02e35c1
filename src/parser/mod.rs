//! Alert message parsing
//!
//! Turns an inbound webhook payload into a partial set of signal fields.
//! Two shapes are understood:
//! - Structured JSON objects (`action`, `symbol`, `timeframe`, `price`, ...)
//! - Free-text alert bodies with one labeled field per line

mod freetext;


pub use freetext::{parse_free_text, FieldLabels};

use crate::error::ParseError;
use crate::types::Action;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Keys that carry a free-text alert body inside a JSON object
const TEXT_KEYS: [&str; 3] = ["message", "content", "text"];

/// Which path produced a parse result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    Structured,
    FreeText,
}

/// Fields extracted from an alert; anything not found stays `None`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedAlert {
    pub format: PayloadFormat,
    pub symbol: Option<String>,
    pub action: Option<Action>,
    pub timeframe: Option<String>,
    pub price: Option<Decimal>,
    pub strategy: Option<String>,
    pub timestamp: Option<String>,
    /// Fields that were present but carried an unusable value
    pub invalid: Vec<String>,
    /// Field names seen in the payload
    pub received: Vec<String>,
}

impl ParsedAlert {
    pub fn empty(format: PayloadFormat) -> Self {
        Self {
            format,
            symbol: None,
            action: None,
            timeframe: None,
            price: None,
            strategy: None,
            timestamp: None,
            invalid: Vec::new(),
            received: Vec::new(),
        }
    }
}

/// Payload parser
#[derive(Debug, Clone, Default)]
pub struct MessageParser {
    labels: FieldLabels,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(labels: FieldLabels) -> Self {
        Self { labels }
    }

    /// Parse an inbound payload.
    ///
    /// Absent fields are never an error; only payloads that are neither an
    /// object nor a string are rejected.
    pub fn parse(&self, payload: &Value) -> Result<ParsedAlert, ParseError> {
        match payload {
            Value::Object(obj) => Ok(self.parse_object(obj)),
            Value::String(text) => Ok(parse_free_text(text, &self.labels)),
            Value::Null => Err(ParseError::UnsupportedPayload("null")),
            Value::Bool(_) => Err(ParseError::UnsupportedPayload("bool")),
            Value::Number(_) => Err(ParseError::UnsupportedPayload("number")),
            Value::Array(_) => Err(ParseError::UnsupportedPayload("array")),
        }
    }

    fn parse_object(&self, obj: &Map<String, Value>) -> ParsedAlert {
        let has_structured = ["action", "symbol", "ticker"]
            .iter()
            .any(|k| obj.contains_key(*k));

        if !has_structured {
            let text = TEXT_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str));
            if let Some(text) = text {
                let mut parsed = parse_free_text(text, &self.labels);
                // Structured extras next to a text body still count
                if parsed.strategy.is_none() {
                    parsed.strategy = string_field(obj, "strategy");
                }
                if parsed.timestamp.is_none() {
                    parsed.timestamp = string_field(obj, "timestamp");
                }
                return parsed;
            }
        }

        parse_structured(obj)
    }
}

/// Structured-object path: fields are taken as given and normalized
fn parse_structured(obj: &Map<String, Value>) -> ParsedAlert {
    let mut parsed = ParsedAlert::empty(PayloadFormat::Structured);
    parsed.received = obj.keys().cloned().collect();

    if let Some(raw) = string_field(obj, "action") {
        match Action::from_str(&raw) {
            Ok(action) => parsed.action = Some(action),
            Err(()) => parsed.invalid.push("action".to_string()),
        }
    }

    parsed.symbol = string_field(obj, "symbol")
        .or_else(|| string_field(obj, "ticker"))
        .map(|s| s.to_uppercase());

    parsed.timeframe = string_field(obj, "timeframe");
    parsed.price = obj.get("price").and_then(decimal_value);
    parsed.strategy = string_field(obj, "strategy");
    parsed.timestamp = string_field(obj, "timestamp");

    parsed
}

/// Non-empty string (or number rendered as string) under `key`
fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lenient price parsing. Anything unparsable maps to `None`, never zero.
pub(crate) fn decimal_value(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    parse_decimal(&raw)
}

pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}
