//! Realtime database relay over its REST interface
//!
//! Layout under the configured root node:
//! - `latest`  : overwritten with every accepted signal
//! - `history` : one pushed child per signal, never trimmed here
//! - `completions/<id>` : processed callbacks

use super::{truncate, SignalSink, SinkKind};
use crate::config::RealtimeDbConfig;
use crate::error::{RelayError, Result};
use crate::types::{CompletionRecord, Signal};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;

pub struct RealtimeDbSink {
    http: Client,
    base_url: String,
    root: String,
    auth: Option<String>,
}

impl RealtimeDbSink {
    pub fn new(config: &RealtimeDbConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: config.database_url.trim().trim_end_matches('/').to_string(),
            root: config.root.trim_matches('/').to_string(),
            auth: config.auth.clone().filter(|a| !a.is_empty()),
        })
    }

    /// REST URL of a node below the root
    pub fn node_url(&self, node: &str) -> String {
        if self.root.is_empty() {
            format!("{}/{}.json", self.base_url, node)
        } else {
            format!("{}/{}/{}.json", self.base_url, self.root, node)
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(auth) => request.query(&[("auth", auth)]),
            None => request,
        }
    }

    async fn check(&self, response: Response, op: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(RelayError::Sink {
            sink: self.name().to_string(),
            reason: format!("{} -> HTTP {}: {}", op, status.as_u16(), truncate(&error_text, 200)),
        })
    }
}

#[async_trait]
impl SignalSink for RealtimeDbSink {
    fn name(&self) -> &str {
        "realtime_db"
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Database
    }

    async fn deliver(&self, signal: &Signal) -> Result<()> {
        let latest = self
            .authorized(self.http.put(self.node_url("latest")))
            .json(signal)
            .send()
            .await?;
        self.check(latest, "set latest").await?;

        let history = self
            .authorized(self.http.post(self.node_url("history")))
            .json(signal)
            .send()
            .await?;
        self.check(history, "push history").await?;

        tracing::debug!("Signal #{} written to realtime database", signal.id);
        Ok(())
    }

    fn tracks_completion(&self) -> bool {
        true
    }

    async fn record_completion(&self, record: &CompletionRecord) -> Result<()> {
        let node = format!("completions/{}", record.signal_id);
        let saved = self
            .authorized(self.http.put(self.node_url(&node)))
            .json(record)
            .send()
            .await?;
        self.check(saved, "set completion").await?;

        // Only touch `latest` while it still holds this signal
        let latest = self
            .authorized(self.http.get(self.node_url("latest")))
            .send()
            .await?;
        let latest: Value = self.check(latest, "get latest").await?.json().await?;
        if latest.get("id").and_then(Value::as_u64) != Some(record.signal_id) {
            return Ok(());
        }

        let patch = json!({
            "processed": true,
            "processingTime": record.processing_time,
            "result": record.result,
            "completedAt": record.completed_at,
        });
        let patched = self
            .authorized(self.http.patch(self.node_url("latest")))
            .json(&patch)
            .send()
            .await?;
        self.check(patched, "update latest").await?;

        Ok(())
    }
}
