//! Configuration management

use crate::error::{RelayError, Result};
use crate::filter::DEFAULT_ALIASES;
use crate::parser::FieldLabels;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingestor: IngestorConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestorConfig {
    /// Instrument label attached to every signal
    pub instrument: String,
    /// Symbol substrings that identify the instrument (empty = accept all)
    pub symbol_aliases: Vec<String>,
    /// Maximum number of signals kept in memory
    pub history_capacity: usize,
    /// Reject alerts without a timeframe instead of defaulting it
    pub require_timeframe: bool,
    /// Timeframe used when the alert carries none
    pub default_timeframe: String,
    /// Strategy label used when the alert carries none
    pub default_strategy: String,
    /// Id assigned to the first accepted signal
    pub first_signal_id: u64,
    /// Label spellings for free-text alert bodies
    pub labels: FieldLabels,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Per-sink delivery bound in milliseconds
    pub timeout_ms: u64,
    pub remote: Option<RemoteSinkConfig>,
    pub realtime_db: Option<RealtimeDbConfig>,
    pub sqlite: Option<SqliteSinkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSinkConfig {
    /// Endpoint receiving relayed signals (e.g. the trading VM)
    pub url: String,
    /// Bearer credential sent in the Authorization header
    pub auth_token: Option<String>,
    /// Value of the `source` tag in the relayed body
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeDbConfig {
    /// Database root URL, e.g. https://project-default-rtdb.firebaseio.com
    pub database_url: String,
    /// Database secret or ID token passed as the `auth` query parameter
    pub auth: Option<String>,
    /// Node under which `latest` and `history` live
    #[serde(default = "default_db_root")]
    pub root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqliteSinkConfig {
    /// SQLite database path
    pub path: String,
}

fn default_source() -> String {
    "tradingview".to_string()
}

fn default_db_root() -> String {
    "nas100_signals".to_string()
}

fn invalid(reason: &str) -> RelayError {
    RelayError::Config(reason.to_string())
}

/// Locations searched when no config path is given
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config.toml",
    "config.yaml",
    "~/.config/signal-relay/config.toml",
];

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("config path is not valid UTF-8: {}", path.display()))?;

        Self::build(Some(path_str))
    }

    /// Load from the first default location that exists, or from the
    /// environment alone when none does
    pub fn load_default() -> anyhow::Result<Self> {
        match Self::locate(DEFAULT_CONFIG_PATHS) {
            Some(path) => {
                tracing::debug!("Using config file {}", path.display());
                Self::load(path)
            }
            None => {
                tracing::debug!("No config file found, using defaults and environment");
                Self::build(None)
            }
        }
    }

    /// First candidate path that exists, with `~` expanded
    pub fn locate<'a, I>(candidates: I) -> Option<PathBuf>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    fn build(file: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(file).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SIGNAL_RELAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("ingestor.symbol_aliases"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ingestor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ingestor.history_capacity == 0 {
            return Err(invalid("ingestor.history_capacity must be at least 1"));
        }
        if self.relay.timeout_ms == 0 {
            return Err(invalid("relay.timeout_ms must be positive"));
        }
        if let Some(remote) = &self.relay.remote {
            if remote.url.trim().is_empty() {
                return Err(invalid("relay.remote.url is empty"));
            }
        }
        if let Some(db) = &self.relay.realtime_db {
            if db.database_url.trim().is_empty() {
                return Err(invalid("relay.realtime_db.database_url is empty"));
            }
        }
        Ok(())
    }

    /// Names of the configured sinks, in dispatch order
    pub fn sink_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.relay.remote.is_some() {
            names.push("remote");
        }
        if self.relay.realtime_db.is_some() {
            names.push("realtime_db");
        }
        if self.relay.sqlite.is_some() {
            names.push("sqlite");
        }
        names
    }
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            instrument: "NAS100".to_string(),
            symbol_aliases: DEFAULT_ALIASES.iter().map(|a| a.to_string()).collect(),
            history_capacity: 100,
            require_timeframe: true,
            default_timeframe: "15m".to_string(),
            default_strategy: "default".to_string(),
            first_signal_id: 1,
            labels: FieldLabels::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            remote: None,
            realtime_db: None,
            sqlite: None,
        }
    }
}
