//! # Liveseries
//!
//! Live metrics streaming client - one multiplexed WebSocket carrying many
//! named time-series subscriptions from a dashboard's `/timeseries/live`
//! endpoint.
//!
//! ## Features
//!
//! - **Declarative subscriptions**: groups of series keys, replayed in full after every reconnect
//! - **Event fan-out**: generic listeners plus per-group and per-series listeners
//! - **Resilience**: exponential-backoff reconnects with a bounded attempt count
//! - **Health**: periodic ping probe with measured round-trip latency
//!
//! ## Modules
//!
//! - [`client`]: The streaming client, its subscription and listener registries
//! - [`websocket`]: Wire message formats and the socket transport
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use liveseries::{key, ClientConfig, LiveEvent, LiveSeriesClient, Resolution, SubscriptionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LiveSeriesClient::new(&ClientConfig::new("https://dash.example.com"))?;
//!
//!     // Listen for every new point of one series
//!     client.on_append("pod-cpu-default/nginx", |event| {
//!         if let LiveEvent::Append { key, point } = event {
//!             println!("{}: {} @ {}", key, point.v, point.t);
//!         }
//!     });
//!
//!     client.on(key::DISCONNECT, |_| eprintln!("stream lost"));
//!
//!     // Subscriptions may be declared before or after connecting
//!     client.subscribe(
//!         SubscriptionConfig::new("nginx", Resolution::Hi, "0")
//!             .series_key("pod-cpu-default/nginx"),
//!     );
//!     client.connect().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect();
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod websocket;

// Re-export top-level types for convenience
pub use client::{
    key, Backoff, ClientError, ClientResult, ConnectionPhase, ConnectionState, ErrorOrigin,
    ListenerId, LiveEvent, LiveSeriesClient, ReconnectPolicy, StreamError, SubscriptionConfig,
};

pub use websocket::{
    ClientMessage, Connection, Connector, Frame, InitData, Limits, Point, Rejection, Resolution,
    ServerMessage, TransportError, WsConnector,
};

pub use config::{generate_default_config, ClientConfig, Config, ConfigError, LoggingConfig};
