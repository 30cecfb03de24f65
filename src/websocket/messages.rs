//! WebSocket Message Types
//!
//! Defines the JSON frames exchanged between the live-series client and the
//! dashboard's `/timeseries/live` endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sample density requested from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Dense, recent samples
    Hi,
    /// Downsampled samples for long windows
    Lo,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hi => "hi",
            Resolution::Lo => "lo",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hi" => Ok(Resolution::Hi),
            "lo" => Ok(Resolution::Lo),
            other => Err(format!("unknown resolution '{}' (expected hi or lo)", other)),
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Declarative desired state for a group: the full series list, not a delta
    Subscribe {
        #[serde(rename = "groupId")]
        group_id: String,
        res: Resolution,
        since: String,
        series: Vec<String>,
    },
    /// Drop the listed series from a group
    Unsubscribe {
        #[serde(rename = "groupId")]
        group_id: String,
        series: Vec<String>,
    },
}

/// Server-advertised connection limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub max_clients: u32,
    pub max_series_per_client: u32,
    pub max_rate_hz: u32,
}

/// A single sample of one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Timestamp (milliseconds since epoch)
    pub t: f64,
    /// Sample value
    pub v: f64,
    /// Labels identifying the entity the sample belongs to (pod, node, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<HashMap<String, String>>,
}

/// One series the server refused, with its reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub key: String,
    pub reason: String,
}

/// Backfill payload carried by an `init` frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitData {
    #[serde(default)]
    pub series: HashMap<String, Vec<Point>>,
    #[serde(default)]
    pub capabilities: HashMap<String, bool>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once per connection, before any other frame
    Hello {
        #[serde(default)]
        capabilities: HashMap<String, bool>,
        #[serde(default)]
        limits: Option<Limits>,
    },
    /// Per-subscribe acceptance/rejection
    Ack {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(default)]
        accepted: Vec<String>,
        #[serde(default)]
        rejected: Vec<Rejection>,
    },
    /// Full backfill for a group
    Init {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(default)]
        data: InitData,
    },
    /// One incremental point for one series
    Append { key: String, point: Point },
    /// Server-signalled application error
    Error { error: String },
    /// Any `type` this client does not understand yet
    #[serde(other)]
    Unknown,
}
