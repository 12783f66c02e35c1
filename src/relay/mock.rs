//! Mock sink for testing
//!
//! Records what it receives and can be told to fail or stall, so dispatch
//! behaviour can be exercised without network calls.

use super::{SignalSink, SinkKind};
use crate::error::{RelayError, Result};
use crate::types::{CompletionRecord, Signal};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockSinkState {
    pub delivered: Vec<Signal>,
    pub completions: Vec<CompletionRecord>,
    pub attempts: u32,
}

pub struct MockSink {
    name: String,
    kind: SinkKind,
    state: Arc<Mutex<MockSinkState>>,
    simulate_failures: bool,
    latency_ms: u64,
}

impl MockSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: SinkKind::Database,
            state: Arc::new(Mutex::new(MockSinkState::default())),
            simulate_failures: false,
            latency_ms: 0,
        }
    }

    pub fn with_kind(mut self, kind: SinkKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_failures(mut self) -> Self {
        self.simulate_failures = true;
        self
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    /// Shared handle to what the sink has seen
    pub fn state(&self) -> Arc<Mutex<MockSinkState>> {
        self.state.clone()
    }

    async fn simulate(&self) -> Result<()> {
        self.state.lock().attempts += 1;
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
        if self.simulate_failures {
            return Err(RelayError::Sink {
                sink: self.name.clone(),
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SignalSink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        self.kind
    }

    async fn deliver(&self, signal: &Signal) -> Result<()> {
        self.simulate().await?;
        self.state.lock().delivered.push(signal.clone());
        Ok(())
    }

    fn tracks_completion(&self) -> bool {
        true
    }

    async fn record_completion(&self, record: &CompletionRecord) -> Result<()> {
        self.simulate().await?;
        self.state.lock().completions.push(record.clone());
        Ok(())
    }
}
