//! Signal ingestion pipeline
//!
//! parse -> validate -> symbol filter -> store -> relay
//!
//! The ingestor owns the store and the relay dispatcher. It is built once at
//! startup and shared by handle with whatever serves requests.


use crate::config::{Config, IngestorConfig};
use crate::error::{ParseError, Result, ValidationError};
use crate::filter::{FilterDecision, SymbolFilter};
use crate::parser::MessageParser;
use crate::relay::{DispatchReport, RelayDispatcher};
use crate::store::{SignalStore, StoreStats};
use crate::types::{CompletionRecord, Signal};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Result of one ingest call
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Stored locally; `relay` says how the sinks fared
    Accepted { signal: Signal, relay: DispatchReport },
    /// Symbol is not one of the configured aliases
    Filtered { symbol: String },
    /// Required fields missing or malformed
    Invalid(ValidationError),
    /// Payload is neither an object nor text
    Unsupported(ParseError),
}

/// Result of a processed-callback
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub updated: bool,
    pub record: Option<CompletionRecord>,
    pub relay: DispatchReport,
}

/// Aggregate view for the status endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestorStatus {
    pub total_signals: usize,
    pub accepted: u64,
    pub filtered: u64,
    pub rejected: u64,
    pub relay_failures: u64,
    pub history_capacity: usize,
    pub last_signal: Option<Signal>,
    pub server_time: DateTime<Utc>,
    pub uptime_secs: u64,
    pub sinks: Vec<String>,
    pub instrument: String,
}

#[derive(Debug, Default)]
struct Counters {
    filtered: AtomicU64,
    rejected: AtomicU64,
    relay_failures: AtomicU64,
}

pub struct SignalIngestor {
    parser: MessageParser,
    filter: SymbolFilter,
    store: SignalStore,
    dispatcher: RelayDispatcher,
    counters: Counters,
    instrument: String,
    started: Instant,
}

impl SignalIngestor {
    pub fn new(config: &IngestorConfig, dispatcher: RelayDispatcher) -> Self {
        Self {
            parser: MessageParser::with_labels(config.labels.clone()),
            filter: SymbolFilter::new(&config.symbol_aliases),
            store: SignalStore::new(config),
            dispatcher,
            counters: Counters::default(),
            instrument: config.instrument.clone(),
            started: Instant::now(),
        }
    }

    /// Build the ingestor and all configured sinks
    pub async fn from_config(config: &Config) -> Result<Self> {
        let dispatcher = RelayDispatcher::from_config(&config.relay).await?;
        Ok(Self::new(&config.ingestor, dispatcher))
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Run one inbound alert through the pipeline.
    ///
    /// The signal is committed to the local store before any sink is tried,
    /// so relay problems only ever degrade an `Accepted` outcome.
    pub async fn ingest(&self, payload: &Value) -> Result<IngestOutcome> {
        let parsed = match self.parser.parse(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Rejected alert payload: {}", e);
                return Ok(IngestOutcome::Unsupported(e));
            }
        };

        let validated = match self.store.validate(parsed) {
            Ok(v) => v,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "Rejected alert: missing {:?}, invalid {:?}",
                    e.missing,
                    e.invalid
                );
                return Ok(IngestOutcome::Invalid(e));
            }
        };

        if self.filter.check(&validated.symbol) == FilterDecision::Reject {
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Filtered non-{} symbol: {}", self.instrument, validated.symbol);
            return Ok(IngestOutcome::Filtered {
                symbol: validated.symbol,
            });
        }

        let signal = self.store.commit(validated)?;
        tracing::info!(
            "Signal #{} accepted: {} {} {} @ {}",
            signal.id,
            signal.action,
            signal.symbol,
            signal.timeframe,
            signal
                .price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string())
        );

        let relay = self.dispatcher.dispatch(&signal).await;
        let failed = relay.failures().count() as u64;
        if failed > 0 {
            self.counters.relay_failures.fetch_add(failed, Ordering::Relaxed);
        }

        Ok(IngestOutcome::Accepted { signal, relay })
    }

    pub fn current(&self) -> Option<Signal> {
        self.store.current()
    }

    pub fn history(&self, limit: Option<i64>) -> Vec<Signal> {
        self.store.history(limit)
    }

    /// Drop the current signal. Idempotent.
    pub fn clear_current(&self) {
        if let Some(previous) = self.store.clear_current() {
            tracing::info!("Cleared current signal #{}", previous.id);
        }
    }

    /// Apply a processed-callback and forward it to sinks that track completion
    pub async fn mark_processed(
        &self,
        id: u64,
        processing_time: Option<f64>,
        result: Option<String>,
    ) -> CompletionOutcome {
        let Some(record) = self.store.mark_processed(id, processing_time, result) else {
            tracing::debug!("Processed callback for #{} matched no current signal", id);
            return CompletionOutcome {
                updated: false,
                record: None,
                relay: DispatchReport::default(),
            };
        };

        tracing::info!(
            "Signal #{} processed in {:?}ms: {:?}",
            id,
            record.processing_time,
            record.result
        );

        let relay = self.dispatcher.notify_completion(&record).await;
        let failed = relay.failures().count() as u64;
        if failed > 0 {
            self.counters.relay_failures.fetch_add(failed, Ordering::Relaxed);
        }

        CompletionOutcome {
            updated: true,
            record: Some(record),
            relay,
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn status(&self) -> IngestorStatus {
        let stats = self.store.stats();
        IngestorStatus {
            total_signals: stats.history_len,
            accepted: stats.accepted,
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            relay_failures: self.counters.relay_failures.load(Ordering::Relaxed),
            history_capacity: stats.capacity,
            last_signal: self.store.current(),
            server_time: Utc::now(),
            uptime_secs: self.started.elapsed().as_secs(),
            sinks: self.dispatcher.sink_names(),
            instrument: self.instrument.clone(),
        }
    }
}
