//! In-memory transport for tests
//!
//! Every accepted connection hands its server side to the test as a
//! [`MockPeer`], which can read what the client wrote and push frames back.

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use super::transport::{Connection, Connector, Frame, TransportError};

/// Scripted result of one connect attempt
#[derive(Debug, Clone)]
pub enum Outcome {
    Accept,
    Refuse(String),
}

/// Connector that never touches the network
pub struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    peers: mpsc::UnboundedSender<MockPeer>,
    attempts: AtomicUsize,
    attempt_times: Mutex<Vec<Instant>>,
}

impl MockConnector {
    /// Accepts every attempt unless scripted otherwise
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            peers,
            attempts: AtomicUsize::new(0),
            attempt_times: Mutex::new(Vec::new()),
        });
        (connector, rx)
    }

    /// Queue outcomes for the next attempts; afterwards attempts are accepted
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script.lock().extend(outcomes);
    }

    /// Number of connect attempts made so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// When each attempt was made, on the tokio clock
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &Url) -> Result<Connection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().push(Instant::now());

        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Accept);
        if let Outcome::Refuse(reason) = outcome {
            return Err(TransportError::Connect(reason));
        }

        let (client_tx, server_rx) = fmpsc::unbounded::<Frame>();
        let (server_tx, client_rx) = fmpsc::unbounded::<Result<Frame, TransportError>>();

        let _ = self.peers.send(MockPeer {
            outbound: server_rx,
            inbound: server_tx,
        });

        Ok(Connection {
            sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(client_rx),
        })
    }
}

/// Server side of one mock connection
pub struct MockPeer {
    outbound: fmpsc::UnboundedReceiver<Frame>,
    inbound: fmpsc::UnboundedSender<Result<Frame, TransportError>>,
}

impl MockPeer {
    pub fn send_text(&self, text: &str) {
        let _ = self.inbound.unbounded_send(Ok(Frame::Text(text.to_string())));
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    pub fn send_frame(&self, frame: Frame) {
        let _ = self.inbound.unbounded_send(Ok(frame));
    }

    /// Sends the standard `hello` frame
    pub fn hello(&self) {
        self.send_json(serde_json::json!({
            "type": "hello",
            "capabilities": {},
            "limits": {"maxClients": 1, "maxSeriesPerClient": 10, "maxRateHz": 5}
        }));
    }

    /// Abnormal closure: the stream ends without a close frame
    pub fn drop_connection(self) {
        drop(self);
    }

    /// Frames the client has written so far
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = self.outbound.try_next() {
            frames.push(frame);
        }
        frames
    }

    /// Text frames the client has written so far, parsed as JSON
    pub fn drain_json(&mut self) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => serde_json::from_str(&text).ok(),
                _ => None,
            })
            .collect()
    }

    /// Next frame the client writes, waiting up to a second
    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(Duration::from_secs(1), self.outbound.next())
            .await
            .ok()
            .flatten()
    }
}

/// Wire form of a subscribe message, for comparisons
pub fn subscribe_json(group_id: &str, res: &str, since: &str, series: &[&str]) -> Value {
    serde_json::json!({
        "type": "subscribe",
        "groupId": group_id,
        "res": res,
        "since": since,
        "series": series,
    })
}

/// Whether a drained value is a subscribe frame
pub fn is_subscribe(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("subscribe")
}
