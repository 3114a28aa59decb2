pub mod config;
pub mod types;

pub use config::{Config, ConnectionEntry};
pub use types::{
    ConnectOptions, FrameHeaderRule, HistoryConfig, NetworkConnectionConfig, RuleTarget,
    StorageConfig, TcpConnectionOptions, TransportKind, UdpConnectionOptions,
};
