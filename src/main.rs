//! Liveseries CLI
//!
//! Command-line interface for the live-series stream:
//! - Tail series from a dashboard as JSON lines
//! - Generate a default config file
//!
//! # Configuration
//!
//! Settings come from `--config`, else the default config locations, and are
//! overridden by `LIVESERIES_*` environment variables. `RUST_LOG` takes
//! precedence over the configured log level.

use anyhow::Context;
use clap::{Parser, Subcommand};
use liveseries::{
    generate_default_config, key, Config, ConnectionPhase, LiveEvent, LiveSeriesClient,
    LoggingConfig, Resolution, SubscriptionConfig,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "liveseries")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stream live metrics from a dashboard's /timeseries/live endpoint")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Dashboard origin, overrides the config file
    #[arg(long, global = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Subscribe to series and print every event as a JSON line
    Tail {
        /// Series keys (e.g. pod-cpu-default/nginx)
        #[arg(required = true)]
        series: Vec<String>,
        /// Subscription group id
        #[arg(short, long, default_value = "cli")]
        group: String,
        /// Resolution (hi, lo)
        #[arg(short, long, default_value = "hi")]
        res: Resolution,
        /// Backfill window start, passed through to the server
        #[arg(short, long, default_value = "0")]
        since: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
            Ok(())
        }
        Commands::Tail {
            series,
            group,
            res,
            since,
        } => {
            let config = load_config(cli.config.as_deref(), cli.base_url)?;
            init_logging(&config.logging);

            tail(config, group, res, since, series).await
        }
    }
}

async fn tail(
    config: Config,
    group: String,
    res: Resolution,
    since: String,
    series: Vec<String>,
) -> anyhow::Result<()> {
    let client = LiveSeriesClient::new(&config.client)?;
    tracing::info!("Liveseries v{} streaming from {}", env!("CARGO_PKG_VERSION"), client.endpoint());

    for event in [
        key::CONNECT,
        key::DISCONNECT,
        key::ERROR,
        key::HELLO,
        key::ACK,
        key::INIT,
        key::APPEND,
    ] {
        let handle = client.clone();
        client.on(event, move |event| {
            println!("{}", event_json(event, handle.phase()));
        });
    }

    client.subscribe(SubscriptionConfig::new(group, res, since).series(series));
    client.connect().await.context("connecting to live series stream")?;

    tokio::signal::ctrl_c().await?;
    tracing::info!(phase = %client.phase(), "Shutting down...");
    println!(
        "{}",
        json!({"event": "state", "state": client.connection_state()})
    );
    client.disconnect();

    Ok(())
}

/// Resolve the config before the real subscriber exists
///
/// Loader messages go through a temporary stderr subscriber so the source
/// of the config is still reported.
fn load_config(path: Option<&Path>, base_url: Option<String>) -> anyhow::Result<Config> {
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("liveseries=info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    let mut config = tracing::subscriber::with_default(bootstrap, || match path {
        Some(path) => {
            let config = Config::load_with_env(path)?;
            tracing::info!("Loaded config from {:?}", path);
            Ok::<_, anyhow::Error>(config)
        }
        None => Ok(Config::load_default()),
    })?;

    if let Some(base_url) = base_url {
        config.client.base_url = base_url;
    }
    Ok(config)
}

fn event_json(event: &LiveEvent, phase: ConnectionPhase) -> serde_json::Value {
    match event {
        LiveEvent::Connect => json!({"event": key::CONNECT, "phase": phase}),
        LiveEvent::Disconnect { reason } => {
            json!({"event": key::DISCONNECT, "phase": phase, "reason": reason})
        }
        LiveEvent::Error(err) => json!({
            "event": key::ERROR,
            "origin": format!("{:?}", err.origin).to_lowercase(),
            "message": err.message,
        }),
        LiveEvent::Hello {
            capabilities,
            limits,
        } => json!({"event": key::HELLO, "capabilities": capabilities, "limits": limits}),
        LiveEvent::Ack {
            group_id,
            accepted,
            rejected,
        } => json!({
            "event": key::ACK,
            "groupId": group_id,
            "accepted": accepted,
            "rejected": rejected,
        }),
        LiveEvent::Init { group_id, data } => json!({
            "event": key::INIT,
            "groupId": group_id,
            "series": data.series.iter().map(|(k, points)| (k.clone(), points.len())).collect::<std::collections::HashMap<_, _>>(),
        }),
        LiveEvent::Append { key: series_key, point } => {
            json!({"event": key::APPEND, "key": series_key, "point": point})
        }
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("liveseries={}", config.level)));

    // Logs go to stderr so stdout stays a clean JSON-lines stream
    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
