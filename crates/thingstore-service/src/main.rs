//! thingstore - value history host.
//!
//! Run with: `cargo run -p thingstore-service -- serve`

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thingstore_service::{Config, CursorSweeper, Recorder, session};
use thingstore_types::{AffordanceType, ThingValue};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

/// thingstore - value history for IoT Things.
#[derive(Parser, Debug)]
#[command(name = "thingstore")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Storage backend, `sqlite` or `memory` (overrides config).
    #[arg(short, long, global = true)]
    backend: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve JSON requests on stdin and record published messages (default).
    Serve,

    /// Read a range of a Thing's history and print it as JSON.
    Read {
        /// Thing ID.
        thing_id: String,

        /// Only values of this affordance.
        #[arg(long)]
        name: Option<String>,

        /// Start of the range (RFC 3339), defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        from: Option<OffsetDateTime>,

        /// Range length in seconds; negative reads backward.
        #[arg(long, default_value_t = -3600, allow_negative_numbers = true)]
        duration: i64,

        /// Maximum number of values after the first; 0 uses the configured default.
        #[arg(long, default_value_t = 0)]
        limit: i64,
    },

    /// Record a single value.
    Add {
        /// Thing ID.
        thing_id: String,

        /// Affordance name.
        name: String,

        /// JSON payload.
        data: String,

        /// Affordance type.
        #[arg(long, default_value = "property")]
        affordance_type: AffordanceType,

        /// Sender ID.
        #[arg(long, default_value = "cli")]
        sender: String,

        /// Timestamp (RFC 3339), defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: Option<OffsetDateTime>,
    },
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(s, &Rfc3339)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries responses
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thingstore_service=info".parse()?)
                .add_directive("thingstore_history=info".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Serve) | None => serve(config).await,
        Some(Command::Read {
            thing_id,
            name,
            from,
            duration,
            limit,
        }) => {
            let history = config.open_history()?;
            let from = from.unwrap_or_else(OffsetDateTime::now_utc);
            let page = history.read_history(&thing_id, name.as_deref(), from, duration, limit)?;
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
        Some(Command::Add {
            thing_id,
            name,
            data,
            affordance_type,
            sender,
            timestamp,
        }) => {
            let history = config.open_history()?;
            let mut value = ThingValue::new(thing_id, name, affordance_type, sender)
                .with_data(serde_json::from_str(&data)?);
            value.timestamp = timestamp;
            history.add_value(value)?;
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    if let Some(backend) = &args.backend {
        config.storage.backend = backend.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        "Opening {} backend at {:?}",
        config.storage.backend, config.storage.path
    );
    let history = Arc::new(config.open_history()?);

    let recorder = Recorder::start(
        Arc::clone(&history),
        config.filters.clone(),
        &config.recorder,
    );
    let sweeper = CursorSweeper::start(Arc::clone(&history), config.history.sweep_interval());

    info!("Reading requests from stdin");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = session::run(Arc::clone(&history), &recorder, stdin, tokio::io::stdout()).await;

    sweeper.stop().await;
    let stats = recorder.shutdown().await;
    info!(
        "Input closed: {} recorded, {} filtered, {} dropped",
        stats.stored, stats.filtered, stats.dropped
    );

    result?;
    Ok(())
}
