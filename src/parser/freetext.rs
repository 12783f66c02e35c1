//! Labeled free-text alert bodies
//!
//! TradingView alert templates often look like:
//!
//! ```text
//! 종목: ETHUSDT.P
//! 매매: sell
//! 주기: 1m
//! 가격: 4699.11
//! ```
//!
//! Each field is looked up independently. The first labeled line whose value
//! passes the field's rule wins, so an unfilled `{{placeholder}}` line ahead
//! of a real one is skipped. A field is reported invalid only when every
//! labeled line for it fails.

use super::{parse_decimal, ParsedAlert, PayloadFormat};
use crate::types::Action;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Label spellings recognized for each field
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldLabels {
    pub instrument: Vec<String>,
    pub action: Vec<String>,
    pub timeframe: Vec<String>,
    pub price: Vec<String>,
}

impl Default for FieldLabels {
    fn default() -> Self {
        fn owned(labels: &[&str]) -> Vec<String> {
            labels.iter().map(|l| l.to_string()).collect()
        }

        Self {
            instrument: owned(&["종목", "ticker", "symbol"]),
            action: owned(&["매매", "action", "side"]),
            timeframe: owned(&["주기", "timeframe", "interval"]),
            price: owned(&["가격", "price"]),
        }
    }
}

/// Parse a free-text alert body
pub fn parse_free_text(text: &str, labels: &FieldLabels) -> ParsedAlert {
    let mut parsed = ParsedAlert::empty(PayloadFormat::FreeText);

    let symbol = labeled_field(&mut parsed, "symbol", text, &labels.instrument, |raw| {
        ticker_token(raw).map(str::to_string)
    });
    let action = labeled_field(&mut parsed, "action", text, &labels.action, action_token);
    let timeframe = labeled_field(&mut parsed, "timeframe", text, &labels.timeframe, |raw| {
        timeframe_token(raw).map(str::to_string)
    });
    let price = labeled_field(&mut parsed, "price", text, &labels.price, price_token);

    parsed.symbol = symbol;
    parsed.action = action;
    parsed.timeframe = timeframe;
    parsed.price = price;
    parsed
}

/// First value among lines labeled with any of `labels` that passes `rule`.
///
/// Records `name` as received when any labeled line exists, and as invalid
/// when none of them passes.
fn labeled_field<'a, T>(
    parsed: &mut ParsedAlert,
    name: &str,
    text: &'a str,
    labels: &[String],
    rule: impl Fn(&'a str) -> Option<T>,
) -> Option<T> {
    let mut values = text
        .lines()
        .filter_map(|line| labels.iter().find_map(|label| labeled_value(line, label)))
        .peekable();
    values.peek()?;

    parsed.received.push(name.to_string());
    let value = values.find_map(rule);
    if value.is_none() {
        parsed.invalid.push(name.to_string());
    }
    value
}

fn labeled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let line = line.trim_start();
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = line[label.len()..].trim_start();
    let value = rest.strip_prefix(':')?;
    Some(value.trim())
}

/// Leading run of uppercase ASCII letters, digits and `.`
fn ticker_token(raw: &str) -> Option<&str> {
    let end = raw
        .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    (end > 0).then(|| &raw[..end])
}

/// Exactly `buy` or `sell`, any case, as a whole word
fn action_token(raw: &str) -> Option<Action> {
    let end = raw
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(raw.len());
    Action::from_str(&raw[..end]).ok()
}

/// `<digits><s|m|h>`
fn timeframe_token(raw: &str) -> Option<&str> {
    let digits = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    if digits == 0 {
        return None;
    }
    let unit = raw[digits..].chars().next()?;
    if !matches!(unit, 's' | 'm' | 'h') {
        return None;
    }
    let end = digits + 1;
    let trailing_ok = raw[end..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_ascii_alphanumeric());
    trailing_ok.then(|| &raw[..end])
}

/// Optional sign, digits, optional fraction
fn price_token(raw: &str) -> Option<Decimal> {
    let bytes = raw.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == int_start {
        return None;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            end = frac_end;
        }
    }
    parse_decimal(&raw[..end])
}
