use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Udp => write!(f, "udp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConnectionConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    /// Connect timeout in milliseconds. `None` falls back to 5000.
    pub timeout_ms: Option<u64>,
}

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

impl NetworkConnectionConfig {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpConnectionOptions {
    pub keep_alive: Option<bool>,
    /// Nagle's algorithm is disabled unless this is explicitly `false`.
    pub no_delay: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UdpConnectionOptions {
    pub broadcast: Option<bool>,
}

/// Per-transport socket options passed alongside a [`NetworkConnectionConfig`].
/// Only the table matching the connection's transport is consulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    #[serde(default)]
    pub tcp: TcpConnectionOptions,
    #[serde(default)]
    pub udp: UdpConnectionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeaderRule {
    pub id: String,
    /// Plain connection id, or the composite "transport:connId:remoteId" form
    /// produced by the frame editor. Decoded once via [`RuleTarget::parse`].
    pub connection_id: String,
    pub header_patterns: Vec<String>,
    pub enabled: bool,
}

/// A rule's addressing target, decoded from the connection id field at the
/// configuration boundary so the per-packet match never re-parses strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTarget {
    pub connection_id: String,
    pub remote_id: Option<String>,
}

impl RuleTarget {
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() >= 3 {
            RuleTarget {
                connection_id: parts[1].to_string(),
                remote_id: Some(parts[2..].join(":")),
            }
        } else {
            RuleTarget {
                connection_id: raw.to_string(),
                remote_id: None,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub enabled: bool,
    pub rule: Option<FrameHeaderRule>,
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,
    /// Rotation threshold in megabytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_true")]
    pub enable_rotation: bool,
    #[serde(default = "default_rotation_count")]
    pub rotation_count: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rule: None,
            capture_dir: default_capture_dir(),
            max_file_size: default_max_file_size(),
            enable_rotation: true,
            rotation_count: default_rotation_count(),
        }
    }
}

fn default_capture_dir() -> PathBuf {
    PathBuf::from("capture")
}

fn default_max_file_size() -> u64 {
    10
}

fn default_rotation_count() -> usize {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default)]
    pub groups: Vec<crate::history::types::ChannelGroup>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_history_dir(),
            flush_interval_secs: default_flush_interval(),
            retention_days: default_retention_days(),
            groups: Vec::new(),
        }
    }
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}

fn default_flush_interval() -> u64 {
    30
}

fn default_retention_days() -> u32 {
    30
}
