//! WebSocket Wire Layer
//!
//! Message formats and the socket transport used by the live-series client.
//!
//! ## Architecture
//!
//! - **Messages**: Defines client and server message formats
//! - **Transport**: Frames, the `Connector` seam and its tungstenite implementation
//!
//! ## Protocol
//!
//! The client connects to `/timeseries/live` and declares interest per group:
//!
//! ```json
//! {"type": "subscribe", "groupId": "nginx", "res": "hi", "since": "0", "series": ["pod-cpu-default/nginx"]}
//! ```
//!
//! The server answers with `hello` once per connection, then `ack`, `init`
//! and a stream of `append` frames:
//!
//! ```json
//! {"type": "append", "key": "pod-cpu-default/nginx", "point": {"t": 1699000000000, "v": 0.42}}
//! ```

mod messages;
mod transport;

#[cfg(test)]
pub mod mock;

pub use messages::{ClientMessage, InitData, Limits, Point, Rejection, Resolution, ServerMessage};
pub use transport::{
    Connection, Connector, Frame, FrameSink, FrameStream, TransportError, WsConnector, CLOSE_NORMAL,
};
