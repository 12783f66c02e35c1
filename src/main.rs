//! TradingView Signal Relay
//!
//! Drives the webhook core from the command line.

use clap::{Parser, Subcommand};
use signal_relay::{
    api::{ApiRequest, WebhookHandler},
    config::Config,
    filter::SymbolFilter,
    ingestor::SignalIngestor,
    parser::MessageParser,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "signal-relay")]
#[command(about = "TradingView alert webhook ingestor and relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (searches default locations when omitted)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed JSON-lines requests through the webhook handler
    Replay {
        /// Request file, or "-" for stdin
        #[arg(default_value = "-")]
        input: String,
    },
    /// Parse a single alert message and show the extracted fields
    Parse {
        /// Alert text or JSON; "\n" escapes are expanded
        text: String,
    },
    /// Validate configuration and list sinks
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging (stderr keeps stdout clean for replay output)
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Replay { input } => replay(config, &input).await,
        Commands::Parse { text } => parse_message(config, &text),
        Commands::CheckConfig => check_config(config),
    }
}

async fn replay(config: Config, input: &str) -> anyhow::Result<()> {
    let ingestor = SignalIngestor::from_config(&config).await?;
    let handler = WebhookHandler::new(Arc::new(ingestor));

    tracing::info!("Replaying requests from {}", input);

    let reader: Box<dyn AsyncRead + Unpin + Send> = if input == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(tokio::fs::File::open(input).await?)
    };
    let mut lines = BufReader::new(reader).lines();

    let mut handled = 0usize;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let request: ApiRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!("Skipping malformed request line: {}", e);
                println!("{}", serde_json::json!({ "error": format!("malformed request: {}", e) }));
                continue;
            }
        };

        let response = handler.handle(&request).await;
        println!("{}", serde_json::to_string(&response)?);
        handled += 1;
    }

    let status = handler.ingestor().status();
    tracing::info!(
        "Replay done: {} requests, {} accepted, {} filtered, {} rejected, {} relay failures",
        handled,
        status.accepted,
        status.filtered,
        status.rejected,
        status.relay_failures
    );

    Ok(())
}

fn parse_message(config: Config, text: &str) -> anyhow::Result<()> {
    let text = text.replace("\\n", "\n");
    let payload = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

    let parsed = MessageParser::with_labels(config.ingestor.labels.clone()).parse(&payload)?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);

    if let Some(symbol) = &parsed.symbol {
        let filter = SymbolFilter::new(&config.ingestor.symbol_aliases);
        println!(
            "\nSymbol {} is {} by the {} filter",
            symbol,
            if filter.accepts(symbol) { "accepted" } else { "rejected" },
            config.ingestor.instrument
        );
    }

    Ok(())
}

fn check_config(config: Config) -> anyhow::Result<()> {
    let ingestor = &config.ingestor;

    println!("\nSignal relay configuration\n");
    println!("Instrument:        {}", ingestor.instrument);
    println!("Symbol aliases:    {}", ingestor.symbol_aliases.join(", "));
    println!("History capacity:  {}", ingestor.history_capacity);
    println!("Require timeframe: {}", ingestor.require_timeframe);
    println!("Default timeframe: {}", ingestor.default_timeframe);
    println!("First signal id:   {}", ingestor.first_signal_id);
    println!("Relay timeout:     {}ms", config.relay.timeout_ms);

    let sinks = config.sink_names();
    if sinks.is_empty() {
        println!("Sinks:             none (local storage only)");
    } else {
        println!("Sinks:             {}", sinks.join(", "));
    }

    Ok(())
}
