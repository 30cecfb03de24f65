//! Client error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::websocket::TransportError;

/// Errors returned by the live-series client
///
/// Only `connect()` surfaces these; everything after the socket is open is
/// reported through events.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The socket failed before it opened
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// `disconnect()` was called while the attempt was in flight
    #[error("Connection attempt aborted by disconnect")]
    Aborted,

    /// Invalid client configuration (bad endpoint, unsupported scheme)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
