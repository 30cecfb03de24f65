//! Connection lifecycle state

use serde::Serialize;
use std::collections::HashMap;

use crate::websocket::Limits;

/// Where the client is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// No socket; auto-reconnect may or may not be enabled
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// Socket open
    Connected,
    /// Socket lost; a reconnect is scheduled
    Reconnecting,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Health of the streaming connection
///
/// Callers only ever receive copies via `connection_state()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub connected: bool,
    /// Capabilities from the last `hello`
    pub capabilities: Option<HashMap<String, bool>>,
    /// Limits from the last `hello`
    pub limits: Option<Limits>,
    /// Round trip of the last health probe, in milliseconds
    pub latency: u64,
    pub last_error: Option<String>,
}
