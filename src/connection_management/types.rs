use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::configuration::types::TransportKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Read-only view of one live connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    pub status: ConnectionStatus,
    pub last_activity: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Monotonic per-connection counters, discarded with the connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub connection_time: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub info: ConnectionInfo,
    pub stats: ConnectionStats,
}

/// What the manager publishes to its subscriber. `Data` carries only
/// unclassified chunks; classified frames go to the capture log instead.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected { id: String },
    StatusChanged { id: String, status: ConnectionStatus },
    Data { id: String, bytes: Vec<u8> },
    Error { id: String, message: String },
    Closed { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub bytes_sent: usize,
    pub elapsed: Duration,
}
