pub mod connection_manager;
pub mod types;

pub use connection_manager::ConnectionManager;
pub use types::{
    ConnectionEvent, ConnectionInfo, ConnectionSnapshot, ConnectionStats, ConnectionStatus,
    SendReport,
};
