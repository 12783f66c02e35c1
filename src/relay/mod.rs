//! Signal relay to downstream sinks
//!
//! Accepted signals are fanned out to every configured sink:
//! - Remote HTTP endpoint (the machine that actually trades)
//! - Realtime database (`latest` slot + append-only history)
//! - Local SQLite mirror
//!
//! Each sink is attempted once, concurrently, under its own timeout. A sink
//! failure never aborts the others and never fails the ingest; it shows up
//! in the [`DispatchReport`] instead.

pub mod mock;
mod realtime_db;
mod remote;
mod sqlite;

#[cfg(test)]
mod tests;

pub use mock::MockSink;
pub use realtime_db::RealtimeDbSink;
pub use remote::RemoteSink;
pub use sqlite::SqliteSink;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::types::{CompletionRecord, Signal};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What kind of system a sink writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Remote,
    Database,
}

/// Downstream destination for accepted signals
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Sink name used in logs and reports
    fn name(&self) -> &str;

    fn kind(&self) -> SinkKind;

    /// Deliver a freshly accepted signal
    async fn deliver(&self, signal: &Signal) -> Result<()>;

    /// Whether this sink stores completion callbacks
    fn tracks_completion(&self) -> bool {
        false
    }

    /// Record that a signal was processed downstream
    async fn record_completion(&self, _record: &CompletionRecord) -> Result<()> {
        Ok(())
    }
}

/// Result of one sink attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SinkStatus {
    Delivered,
    Failed { error: String },
    TimedOut { after_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkOutcome {
    pub sink: String,
    pub kind: SinkKind,
    #[serde(flatten)]
    pub status: SinkStatus,
    pub elapsed_ms: u64,
}

impl SinkOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, SinkStatus::Delivered)
    }
}

/// Per-sink results of a dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sinks: Vec<SinkOutcome>,
}

impl DispatchReport {
    /// True when at least one sink did not receive the signal
    pub fn is_degraded(&self) -> bool {
        self.sinks.iter().any(|s| !s.is_delivered())
    }

    pub fn delivered_count(&self) -> usize {
        self.sinks.iter().filter(|s| s.is_delivered()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SinkOutcome> {
        self.sinks.iter().filter(|s| !s.is_delivered())
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// Fans signals out to sinks with isolated failure handling
#[derive(Clone)]
pub struct RelayDispatcher {
    sinks: Vec<Arc<dyn SignalSink>>,
    timeout: Duration,
}

impl RelayDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            timeout,
        }
    }

    /// Dispatcher without sinks (local storage only)
    pub fn disabled() -> Self {
        Self::new(Duration::from_millis(RelayConfig::default().timeout_ms))
    }

    /// Build all sinks named in the relay configuration
    pub async fn from_config(config: &RelayConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut dispatcher = Self::new(timeout);

        if let Some(remote) = &config.remote {
            dispatcher.add_sink(Arc::new(RemoteSink::new(remote, timeout)?));
        }
        if let Some(db) = &config.realtime_db {
            dispatcher.add_sink(Arc::new(RealtimeDbSink::new(db, timeout)?));
        }
        if let Some(sqlite) = &config.sqlite {
            dispatcher.add_sink(Arc::new(SqliteSink::connect(&sqlite.path).await?));
        }

        tracing::info!(
            "Relay configured with {} sink(s): {:?}",
            dispatcher.sinks.len(),
            dispatcher.sink_names()
        );
        Ok(dispatcher)
    }

    pub fn with_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn SignalSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deliver a signal to every sink. Never fails; see the report.
    pub async fn dispatch(&self, signal: &Signal) -> DispatchReport {
        let attempts = self
            .sinks
            .iter()
            .map(|sink| self.attempt(sink.as_ref(), sink.deliver(signal)));

        let report = DispatchReport {
            sinks: join_all(attempts).await,
        };

        if report.is_degraded() {
            tracing::warn!(
                "Signal #{} relayed to {}/{} sinks",
                signal.id,
                report.delivered_count(),
                report.sinks.len()
            );
        } else if !report.is_empty() {
            tracing::debug!("Signal #{} relayed to all sinks", signal.id);
        }

        report
    }

    /// Forward a completion callback to sinks that track it
    pub async fn notify_completion(&self, record: &CompletionRecord) -> DispatchReport {
        let attempts = self
            .sinks
            .iter()
            .filter(|sink| sink.tracks_completion())
            .map(|sink| self.attempt(sink.as_ref(), sink.record_completion(record)));

        DispatchReport {
            sinks: join_all(attempts).await,
        }
    }

    async fn attempt<F>(&self, sink: &dyn SignalSink, delivery: F) -> SinkOutcome
    where
        F: Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let status = match tokio::time::timeout(self.timeout, delivery).await {
            Ok(Ok(())) => SinkStatus::Delivered,
            Ok(Err(e)) => {
                tracing::warn!("Sink {} failed: {}", sink.name(), e);
                SinkStatus::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                let after_ms = self.timeout.as_millis() as u64;
                let err = RelayError::Timeout {
                    sink: sink.name().to_string(),
                    after_ms,
                };
                tracing::warn!("{}", err);
                SinkStatus::TimedOut { after_ms }
            }
        };

        SinkOutcome {
            sink: sink.name().to_string(),
            kind: sink.kind(),
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Cut long upstream error bodies down for logs and reports
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
