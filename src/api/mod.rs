//! Webhook request/response mapping
//!
//! Transport-agnostic: whatever accepts HTTP hands over method, query and
//! body as an [`ApiRequest`] and writes back the [`ApiResponse`].

mod handler;


pub use handler::WebhookHandler;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const ALLOWED_METHODS: [&str; 3] = ["GET", "POST", "OPTIONS"];

pub const QUERY_ENDPOINTS: [&str; 4] = ["current", "history", "status", "clear"];

/// Inbound request as seen by the core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: String,
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            ..Self::default()
        }
    }

    pub fn get(endpoint: &str) -> Self {
        Self::new("GET").with_query("endpoint", endpoint)
    }

    pub fn post(body: Value) -> Self {
        Self::new("POST").with_body(body)
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Use a raw request body: JSON when it parses, plain text otherwise.
    /// TradingView sends `text/plain` for non-JSON alert messages.
    pub fn with_raw_body(self, raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return self;
        }
        let body = serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.with_body(body)
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Response handed back to the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: cors_headers(),
            body: Some(body),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: cors_headers(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn cors_headers() -> Vec<(String, String)> {
    vec![
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        (
            "Access-Control-Allow-Methods".to_string(),
            ALLOWED_METHODS.join(", "),
        ),
        (
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type".to_string(),
        ),
    ]
}
