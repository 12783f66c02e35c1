//! TradingView Signal Relay
//!
//! Receives TradingView alert webhooks, normalizes them into signals, keeps
//! the current signal and a bounded history in memory, and relays accepted
//! signals to a remote host and/or a realtime database.

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingestor;
pub mod parser;
pub mod relay;
pub mod store;
pub mod types;
