//! Remote HTTP relay
//!
//! POSTs each accepted signal to a remote host as JSON.

use super::{truncate, SignalSink, SinkKind};
use crate::config::RemoteSinkConfig;
use crate::error::{RelayError, Result};
use crate::types::Signal;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub struct RemoteSink {
    http: Client,
    url: String,
    auth_token: Option<String>,
    source: String,
}

impl RemoteSink {
    pub fn new(config: &RemoteSinkConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url: config.url.trim().to_string(),
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
            source: config.source.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Signal JSON with the relay `source` tag
    pub fn body(&self, signal: &Signal) -> Result<Value> {
        let mut body = serde_json::to_value(signal)?;
        if let Value::Object(map) = &mut body {
            map.insert("source".to_string(), Value::String(self.source.clone()));
        }
        Ok(body)
    }
}

#[async_trait]
impl SignalSink for RemoteSink {
    fn name(&self) -> &str {
        "remote"
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Remote
    }

    async fn deliver(&self, signal: &Signal) -> Result<()> {
        let mut request = self.http.post(&self.url).json(&self.body(signal)?);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RelayError::Sink {
                sink: self.name().to_string(),
                reason: format!("HTTP {}: {}", status.as_u16(), truncate(&error_text, 200)),
            });
        }

        tracing::debug!("Signal #{} relayed to {}", signal.id, self.url);
        Ok(())
    }
}
