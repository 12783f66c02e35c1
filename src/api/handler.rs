//! Request routing for the webhook endpoint

use super::{ApiRequest, ApiResponse, ALLOWED_METHODS, QUERY_ENDPOINTS};
use crate::error::{Result, ValidationError};
use crate::ingestor::{IngestOutcome, SignalIngestor};
use crate::relay::DispatchReport;
use crate::types::Signal;
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct WebhookHandler {
    ingestor: Arc<SignalIngestor>,
}

impl WebhookHandler {
    pub fn new(ingestor: Arc<SignalIngestor>) -> Self {
        Self { ingestor }
    }

    pub fn ingestor(&self) -> &SignalIngestor {
        &self.ingestor
    }

    /// Handle one request. Unexpected faults become a bare 500.
    pub async fn handle(&self, req: &ApiRequest) -> ApiResponse {
        match self.route(req).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Webhook handling failed: {}", e);
                ApiResponse::json(500, json!({ "error": "Internal server error" }))
            }
        }
    }

    async fn route(&self, req: &ApiRequest) -> Result<ApiResponse> {
        match req.method.to_ascii_uppercase().as_str() {
            "OPTIONS" => Ok(ApiResponse::empty(200)),
            "GET" => self.query(req),
            "POST" => match req.query_param("endpoint") {
                None | Some("signal") | Some("webhook") => self.ingest(req).await,
                Some("update") => self.update(req).await,
                Some(_) => Ok(invalid_endpoint()),
            },
            _ => Ok(ApiResponse::json(
                405,
                json!({
                    "error": "Method not allowed",
                    "allowed": ALLOWED_METHODS,
                    "received": req.method,
                }),
            )),
        }
    }

    async fn ingest(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let empty = Value::Object(Map::new());
        let payload = req.body.as_ref().unwrap_or(&empty);
        let instrument = self.ingestor.instrument();

        let response = match self.ingestor.ingest(payload).await? {
            IngestOutcome::Accepted { signal, relay } => {
                let data = signal_summary(&signal);
                let relay_body = relay_summary(&relay)?;
                if relay.is_degraded() {
                    ApiResponse::json(
                        202,
                        json!({
                            "success": true,
                            "stored": true,
                            "signalId": signal.id,
                            "message": "Signal stored locally, relay degraded",
                            "data": data,
                            "relay": relay_body,
                        }),
                    )
                } else {
                    ApiResponse::json(
                        200,
                        json!({
                            "success": true,
                            "stored": true,
                            "signalId": signal.id,
                            "message": format!("{} signal received and stored", instrument),
                            "data": data,
                            "relay": relay_body,
                        }),
                    )
                }
            }
            IngestOutcome::Filtered { symbol } => ApiResponse::json(
                200,
                json!({
                    "success": true,
                    "message": "filtered",
                    "symbol": symbol,
                }),
            ),
            IngestOutcome::Invalid(err) => validation_response(&err),
            IngestOutcome::Unsupported(err) => ApiResponse::json(
                400,
                json!({
                    "error": "Unsupported payload",
                    "message": err.to_string(),
                }),
            ),
        };

        Ok(response)
    }

    async fn update(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let body = req.body.as_ref().and_then(Value::as_object);
        let signal_id = body
            .and_then(|b| b.get("signalId").or_else(|| b.get("id")))
            .and_then(id_value);

        let Some(signal_id) = signal_id else {
            return Ok(ApiResponse::json(
                400,
                json!({
                    "error": "Missing required fields",
                    "required": ["signalId"],
                    "received": body.map(|b| b.keys().cloned().collect::<Vec<_>>()).unwrap_or_default(),
                }),
            ));
        };

        let processing_time = body
            .and_then(|b| b.get("processingTime"))
            .and_then(number_value);
        let result = body.and_then(|b| b.get("result")).and_then(|r| match r {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        });

        let outcome = self
            .ingestor
            .mark_processed(signal_id, processing_time, result)
            .await;

        let message = if outcome.updated {
            format!("{} signal status updated", self.ingestor.instrument())
        } else {
            "No matching current signal".to_string()
        };

        Ok(ApiResponse::json(
            200,
            json!({
                "success": true,
                "updated": outcome.updated,
                "signalId": signal_id,
                "message": message,
                "relay": relay_summary(&outcome.relay)?,
            }),
        ))
    }

    fn query(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let method = req.query_param("method").unwrap_or("direct");
        let instrument = self.ingestor.instrument();

        let response = match req.query_param("endpoint") {
            Some("current") => ApiResponse::json(
                200,
                json!({
                    "success": true,
                    "data": serde_json::to_value(self.ingestor.current())?,
                    "method": method,
                    "instrument": instrument,
                }),
            ),
            Some("history") => {
                let limit = req.query_param("limit").and_then(leading_int);
                let history = self.ingestor.history(limit);
                ApiResponse::json(
                    200,
                    json!({
                        "success": true,
                        "count": history.len(),
                        "data": serde_json::to_value(history)?,
                        "method": method,
                        "instrument": instrument,
                    }),
                )
            }
            Some("status") => ApiResponse::json(
                200,
                json!({
                    "success": true,
                    "data": serde_json::to_value(self.ingestor.status())?,
                    "method": method,
                }),
            ),
            Some("clear") => {
                self.ingestor.clear_current();
                ApiResponse::json(
                    200,
                    json!({
                        "success": true,
                        "data": Value::Null,
                        "message": format!("Current {} signal cleared", instrument),
                    }),
                )
            }
            _ => invalid_endpoint(),
        };

        Ok(response)
    }
}

fn invalid_endpoint() -> ApiResponse {
    ApiResponse::json(
        400,
        json!({
            "error": "Invalid endpoint",
            "availableEndpoints": QUERY_ENDPOINTS,
        }),
    )
}

fn validation_response(err: &ValidationError) -> ApiResponse {
    let error = if err.missing.is_empty() {
        "Invalid required fields"
    } else {
        "Missing required fields"
    };

    let mut body = json!({
        "error": error,
        "required": err.required,
        "missing": err.missing,
        "received": err.received,
    });
    if !err.invalid.is_empty() {
        body["invalid"] = json!(err.invalid);
    }

    ApiResponse::json(400, body)
}

/// Fields echoed back to the alert sender
fn signal_summary(signal: &Signal) -> Value {
    json!({
        "action": signal.action,
        "symbol": signal.symbol,
        "timeframe": signal.timeframe,
        "price": signal.price,
        "strategy": signal.strategy,
        "timestamp": signal.timestamp,
        "instrument": signal.instrument,
    })
}

fn relay_summary(report: &DispatchReport) -> Result<Value> {
    Ok(json!({
        "degraded": report.is_degraded(),
        "sinks": serde_json::to_value(&report.sinks)?,
    }))
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Leading signed integer of `raw`, ignoring whatever follows it
fn leading_int(raw: &str) -> Option<i64> {
    let raw = raw.trim_start();
    let sign_len = usize::from(raw.starts_with(|c| c == '-' || c == '+'));
    let digits = raw[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len() - sign_len);
    if digits == 0 {
        return None;
    }
    raw[..sign_len + digits].parse().ok()
}

fn id_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
