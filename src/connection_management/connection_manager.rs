//! # Connection Manager
//!
//! Owns the lifecycle of TCP client and UDP bound sockets and normalizes
//! connect/send/receive/close into one state machine and one statistics model
//! regardless of transport.
//!
//! ```text
//! ┌──────────────┐    ┌───────────────────┐    ┌──────────────────┐
//! │ Field device │───▶│ ConnectionManager │───▶│ Subscriber       │
//! │ sockets      │    │                   │    │ (via mpsc)       │
//! └──────────────┘    │ - Frame Classifier│    └──────────────────┘
//!                     │ - Stats           │    ┌──────────────────┐
//!                     │ - Capture dispatch│───▶│ CaptureStore     │
//!                     └───────────────────┘    └──────────────────┘
//! ```
//!
//! Every received chunk updates the connection's stats and is offered to the
//! classifier. A match means high-volume telemetry: the chunk is handed to the
//! capture store on a spawned task (the receive loop never waits for disk)
//! and is *not* forwarded. Everything else is published as a `Data` event.
//!
//! The state machine is `Connecting → Connected → {Disconnected | Error}`.
//! Terminal states are not retried here, and a failed or errored connection is
//! removed from the active set rather than retained; reconnecting is the
//! caller's decision.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, UdpSocket};
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::types::{
    ConnectionEvent, ConnectionInfo, ConnectionSnapshot, ConnectionStats, ConnectionStatus,
    SendReport,
};
use crate::configuration::types::{
    ConnectOptions, NetworkConnectionConfig, TcpConnectionOptions, TransportKind,
    UdpConnectionOptions,
};
use crate::data_capture::CaptureStore;
use crate::error_handling::types::ConnectionError;
use crate::frame_classification::{CompiledRule, FrameClassifier};

pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
}

struct ManagerShared {
    connections: StdMutex<HashMap<String, ManagedConnection>>,
    classifier: StdMutex<FrameClassifier>,
    capture: Arc<CaptureStore>,
    event_tx: Sender<ConnectionEvent>,
}

struct ManagedConnection {
    transport: TransportKind,
    host: String,
    port: u16,
    status: ConnectionStatus,
    stats: Arc<StdMutex<ConnectionStats>>,
    link: Link,
    reader: Option<JoinHandle<()>>,
}

#[derive(Clone)]
enum Link {
    Tcp {
        writer: Arc<Mutex<OwnedWriteHalf>>,
    },
    Udp {
        socket: Arc<UdpSocket>,
        host: String,
        port: u16,
    },
}

impl ConnectionManager {
    pub fn new(
        capture: Arc<CaptureStore>,
        classifier: FrameClassifier,
        event_tx: Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                connections: StdMutex::new(HashMap::new()),
                classifier: StdMutex::new(classifier),
                capture,
                event_tx,
            }),
        }
    }

    /// Swaps the system-wide capture rule.
    pub fn set_rule(&self, rule: Option<CompiledRule>) {
        self.shared.classifier.lock().unwrap().set_rule(rule);
    }

    /// Opens the link described by `config`. An already-connected id is
    /// rejected; a stale non-connected entry under the same id is torn down
    /// and replaced.
    pub async fn connect(
        &self,
        config: &NetworkConnectionConfig,
        options: &ConnectOptions,
    ) -> Result<(), ConnectionError> {
        {
            let mut connections = self.shared.connections.lock().unwrap();
            if let Some(existing) = connections.get(&config.id) {
                if existing.status == ConnectionStatus::Connected {
                    return Err(ConnectionError::AlreadyConnected(config.id.clone()));
                }
                if let Some(stale) = connections.remove(&config.id) {
                    if let Some(handle) = stale.reader {
                        handle.abort();
                    }
                    debug!("[{}] replaced stale entry", config.id);
                }
            }
        }

        match config.transport {
            TransportKind::Tcp => self.connect_tcp(config, &options.tcp).await,
            TransportKind::Udp => self.bind_udp(config, &options.udp).await,
        }
    }

    async fn connect_tcp(
        &self,
        config: &NetworkConnectionConfig,
        options: &TcpConnectionOptions,
    ) -> Result<(), ConnectionError> {
        let addr = resolve(&config.host, config.port).await?;
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(ConnectionError::SocketError)?;
        if let Some(keep_alive) = options.keep_alive {
            socket
                .set_keepalive(keep_alive)
                .map_err(ConnectionError::SocketError)?;
        }

        let timeout_ms = config.timeout_ms();
        let stream = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            socket.connect(addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("[{}] connect to {} failed: {}", config.id, addr, e);
                return Err(ConnectionError::ConnectFailed(e));
            }
            Err(_) => {
                error!("[{}] connect to {} timed out after {} ms", config.id, addr, timeout_ms);
                return Err(ConnectionError::ConnectTimeout(timeout_ms));
            }
        };
        // Nagle stays off unless the operator explicitly asked for it
        stream
            .set_nodelay(options.no_delay.unwrap_or(true))
            .map_err(ConnectionError::SocketError)?;

        let (read_half, write_half) = stream.into_split();
        let stats = Arc::new(StdMutex::new(ConnectionStats {
            connection_time: Some(Utc::now()),
            ..ConnectionStats::default()
        }));
        // register before spawning so a reader failing instantly can still
        // find and remove its own entry
        self.register(
            config,
            Arc::clone(&stats),
            Link::Tcp {
                writer: Arc::new(Mutex::new(write_half)),
            },
        );
        let reader = tokio::spawn(run_tcp_reader(
            Arc::clone(&self.shared),
            config.id.clone(),
            read_half,
            Arc::clone(&stats),
        ));
        self.attach_reader(&config.id, &stats, reader);
        info!("[{}] tcp connected to {}", config.id, addr);
        self.announce_connected(&config.id).await;
        Ok(())
    }

    async fn bind_udp(
        &self,
        config: &NetworkConnectionConfig,
        options: &UdpConnectionOptions,
    ) -> Result<(), ConnectionError> {
        let socket = UdpSocket::bind((config.host.as_str(), config.port))
            .await
            .map_err(ConnectionError::BindFailed)?;
        if options.broadcast.unwrap_or(false) {
            socket
                .set_broadcast(true)
                .map_err(ConnectionError::SocketError)?;
        }
        let socket = Arc::new(socket);

        let stats = Arc::new(StdMutex::new(ConnectionStats {
            connection_time: Some(Utc::now()),
            ..ConnectionStats::default()
        }));
        self.register(
            config,
            Arc::clone(&stats),
            Link::Udp {
                socket: Arc::clone(&socket),
                host: config.host.clone(),
                port: config.port,
            },
        );
        let reader = tokio::spawn(run_udp_reader(
            Arc::clone(&self.shared),
            config.id.clone(),
            socket,
            Arc::clone(&stats),
        ));
        self.attach_reader(&config.id, &stats, reader);
        info!("[{}] udp bound on {}:{}", config.id, config.host, config.port);
        self.announce_connected(&config.id).await;
        Ok(())
    }

    fn register(
        &self,
        config: &NetworkConnectionConfig,
        stats: Arc<StdMutex<ConnectionStats>>,
        link: Link,
    ) {
        let mut connections = self.shared.connections.lock().unwrap();
        connections.insert(
            config.id.clone(),
            ManagedConnection {
                transport: config.transport,
                host: config.host.clone(),
                port: config.port,
                status: ConnectionStatus::Connected,
                stats,
                link,
                reader: None,
            },
        );
    }

    fn attach_reader(
        &self,
        id: &str,
        stats: &Arc<StdMutex<ConnectionStats>>,
        handle: JoinHandle<()>,
    ) {
        let mut connections = self.shared.connections.lock().unwrap();
        match connections.get_mut(id) {
            Some(entry) if Arc::ptr_eq(&entry.stats, stats) => entry.reader = Some(handle),
            // the reader already tore the entry down, or it was replaced
            _ => handle.abort(),
        }
    }

    async fn announce_connected(&self, id: &str) {
        let _ = self
            .shared
            .event_tx
            .send(ConnectionEvent::Connected { id: id.to_string() })
            .await;
        let _ = self
            .shared
            .event_tx
            .send(ConnectionEvent::StatusChanged {
                id: id.to_string(),
                status: ConnectionStatus::Connected,
            })
            .await;
    }

    /// Idempotent: disconnecting an unknown id is a no-op.
    pub async fn disconnect(&self, id: &str) -> Result<(), ConnectionError> {
        let entry = self.shared.connections.lock().unwrap().remove(id);
        let Some(entry) = entry else {
            return Ok(());
        };
        if let Some(handle) = entry.reader {
            handle.abort();
        }
        if let Link::Tcp { writer } = &entry.link {
            let mut writer = writer.lock().await;
            let _ = writer.shutdown().await;
        }
        info!("[{}] disconnected", id);
        let _ = self
            .shared
            .event_tx
            .send(ConnectionEvent::StatusChanged {
                id: id.to_string(),
                status: ConnectionStatus::Disconnected,
            })
            .await;
        let _ = self
            .shared
            .event_tx
            .send(ConnectionEvent::Closed { id: id.to_string() })
            .await;
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = {
            let connections = self.shared.connections.lock().unwrap();
            connections.keys().cloned().collect()
        };
        for id in ids {
            let _ = self.disconnect(&id).await;
        }
    }

    /// Writes to the peer. For UDP the destination comes from
    /// `target_override` ("host:port", each field falling back to the
    /// configured target) and one datagram is sent.
    pub async fn send(
        &self,
        id: &str,
        data: &[u8],
        target_override: Option<&str>,
    ) -> Result<SendReport, ConnectionError> {
        let (link, stats) = {
            let connections = self.shared.connections.lock().unwrap();
            let entry = connections
                .get(id)
                .ok_or_else(|| ConnectionError::NotFound(id.to_string()))?;
            (entry.link.clone(), Arc::clone(&entry.stats))
        };

        let started = Instant::now();
        let bytes_sent = match link {
            Link::Tcp { writer } => {
                let mut writer = writer.lock().await;
                writer
                    .write_all(data)
                    .await
                    .map_err(ConnectionError::SendFailed)?;
                data.len()
            }
            Link::Udp { socket, host, port } => {
                let (host, port) = resolve_udp_target(target_override, &host, port)?;
                socket
                    .send_to(data, (host.as_str(), port))
                    .await
                    .map_err(ConnectionError::SendFailed)?
            }
        };
        let elapsed = started.elapsed();

        {
            let mut stats = stats.lock().unwrap();
            stats.bytes_sent += bytes_sent as u64;
            stats.messages_sent += 1;
            stats.last_activity = Some(Utc::now());
        }
        debug!("[{}] sent {} byte(s) in {:?}", id, bytes_sent, elapsed);
        Ok(SendReport {
            bytes_sent,
            elapsed,
        })
    }

    pub fn get_connections(&self) -> Vec<ConnectionInfo> {
        let connections = self.shared.connections.lock().unwrap();
        connections
            .iter()
            .map(|(id, entry)| info_of(id, entry))
            .collect()
    }

    pub fn get_connection_status(&self, id: &str) -> Option<ConnectionSnapshot> {
        let connections = self.shared.connections.lock().unwrap();
        connections.get(id).map(|entry| ConnectionSnapshot {
            info: info_of(id, entry),
            stats: entry.stats.lock().unwrap().clone(),
        })
    }

    /// Local address of a UDP endpoint (useful when bound to port 0).
    pub fn local_addr(&self, id: &str) -> Option<SocketAddr> {
        let connections = self.shared.connections.lock().unwrap();
        match connections.get(id)?.link {
            Link::Udp { ref socket, .. } => socket.local_addr().ok(),
            Link::Tcp { .. } => None,
        }
    }
}

fn info_of(id: &str, entry: &ManagedConnection) -> ConnectionInfo {
    let stats = entry.stats.lock().unwrap();
    ConnectionInfo {
        id: id.to_string(),
        transport: entry.transport,
        host: entry.host.clone(),
        port: entry.port,
        status: entry.status,
        last_activity: stats.last_activity,
        error: None,
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConnectionError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|_| ConnectionError::ResolveFailed(format!("{}:{}", host, port)))?;
    addrs
        .next()
        .ok_or_else(|| ConnectionError::ResolveFailed(format!("{}:{}", host, port)))
}

fn resolve_udp_target(
    target: Option<&str>,
    host: &str,
    port: u16,
) -> Result<(String, u16), ConnectionError> {
    let Some(raw) = target else {
        return Ok((host.to_string(), port));
    };
    let (override_host, override_port) = match raw.rsplit_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (raw, None),
    };
    let resolved_host = if override_host.is_empty() {
        host.to_string()
    } else {
        override_host.to_string()
    };
    let resolved_port = match override_port {
        None | Some("") => port,
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| ConnectionError::InvalidTarget(raw.to_string()))?,
    };
    Ok((resolved_host, resolved_port))
}

async fn run_tcp_reader(
    shared: Arc<ManagerShared>,
    id: String,
    mut reader: OwnedReadHalf,
    stats: Arc<StdMutex<ConnectionStats>>,
) {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("[{}] peer closed the connection", id);
                if remove_if_current(&shared, &id, &stats) {
                    let _ = shared
                        .event_tx
                        .send(ConnectionEvent::StatusChanged {
                            id: id.clone(),
                            status: ConnectionStatus::Disconnected,
                        })
                        .await;
                    let _ = shared
                        .event_tx
                        .send(ConnectionEvent::Closed { id: id.clone() })
                        .await;
                }
                break;
            }
            Ok(n) => handle_inbound(&shared, &id, &buf[..n], &stats).await,
            Err(e) => {
                error!("[{}] socket error: {}", id, e);
                if remove_if_current(&shared, &id, &stats) {
                    let _ = shared
                        .event_tx
                        .send(ConnectionEvent::Error {
                            id: id.clone(),
                            message: e.to_string(),
                        })
                        .await;
                }
                break;
            }
        }
    }
}

async fn run_udp_reader(
    shared: Arc<ManagerShared>,
    id: String,
    socket: Arc<UdpSocket>,
    stats: Arc<StdMutex<ConnectionStats>>,
) {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, peer)) => {
                trace!("[{}] {} byte(s) from {}", id, n, peer);
                handle_inbound(&shared, &id, &buf[..n], &stats).await;
            }
            Err(e) => {
                error!("[{}] socket error: {}", id, e);
                if remove_if_current(&shared, &id, &stats) {
                    let _ = shared
                        .event_tx
                        .send(ConnectionEvent::Error {
                            id: id.clone(),
                            message: e.to_string(),
                        })
                        .await;
                }
                break;
            }
        }
    }
}

/// One received chunk: count it, classify it, then either dispatch it to the
/// capture log (spawned, never awaited here) or publish it raw.
async fn handle_inbound(
    shared: &Arc<ManagerShared>,
    id: &str,
    chunk: &[u8],
    stats: &Arc<StdMutex<ConnectionStats>>,
) {
    {
        let mut stats = stats.lock().unwrap();
        stats.bytes_received += chunk.len() as u64;
        stats.messages_received += 1;
        stats.last_activity = Some(Utc::now());
    }

    let matched: Option<String> = {
        let classifier = shared.classifier.lock().unwrap();
        classifier.match_frame(id, chunk).map(|rule| rule.id.clone())
    };

    match matched {
        Some(rule_id) => {
            trace!("[{}] classified {} byte(s) for rule '{}'", id, chunk.len(), rule_id);
            let capture = Arc::clone(&shared.capture);
            let payload = chunk.to_vec();
            tokio::spawn(async move {
                capture.store(&payload, &rule_id).await;
            });
        }
        None => {
            let _ = shared
                .event_tx
                .send(ConnectionEvent::Data {
                    id: id.to_string(),
                    bytes: chunk.to_vec(),
                })
                .await;
        }
    }
}

// A reader task only removes the entry it belongs to; a replacement under the
// same id must survive the old task's teardown.
fn remove_if_current(
    shared: &Arc<ManagerShared>,
    id: &str,
    stats: &Arc<StdMutex<ConnectionStats>>,
) -> bool {
    let mut connections = shared.connections.lock().unwrap();
    if let Some(entry) = connections.get(id) {
        if Arc::ptr_eq(&entry.stats, stats) {
            connections.remove(id);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::{FrameHeaderRule, StorageConfig};
    use tempfile::TempDir;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn tcp_config(id: &str, port: u16) -> NetworkConnectionConfig {
        NetworkConnectionConfig {
            id: id.to_string(),
            transport: TransportKind::Tcp,
            host: "127.0.0.1".to_string(),
            port,
            timeout_ms: Some(1000),
        }
    }

    fn udp_config(id: &str, port: u16) -> NetworkConnectionConfig {
        NetworkConnectionConfig {
            id: id.to_string(),
            transport: TransportKind::Udp,
            host: "127.0.0.1".to_string(),
            port,
            timeout_ms: None,
        }
    }

    fn manager_with(
        capture_dir: Option<&TempDir>,
        rule: Option<FrameHeaderRule>,
    ) -> (ConnectionManager, mpsc::Receiver<ConnectionEvent>, Arc<CaptureStore>) {
        let storage_config = match capture_dir {
            Some(dir) => StorageConfig {
                enabled: true,
                capture_dir: dir.path().to_path_buf(),
                enable_rotation: false,
                ..StorageConfig::default()
            },
            None => StorageConfig::default(),
        };
        let capture = Arc::new(CaptureStore::new(storage_config));
        let classifier = FrameClassifier::with_rule(
            rule.as_ref().map(|r| CompiledRule::compile(r).unwrap()),
        );
        let (tx, rx) = mpsc::channel(100);
        (
            ConnectionManager::new(Arc::clone(&capture), classifier, tx),
            rx,
            capture,
        )
    }

    async fn next_event(rx: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectionEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event wait timed out")
            .expect("event channel closed")
    }

    async fn next_data_event(rx: &mut mpsc::Receiver<ConnectionEvent>) -> (String, Vec<u8>) {
        loop {
            if let ConnectionEvent::Data { id, bytes } = next_event(rx).await {
                return (id, bytes);
            }
        }
    }

    #[tokio::test]
    async fn tcp_connect_send_receive_updates_stats() {
        let _ = env_logger::builder().is_test(true).try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (manager, mut rx, _) = manager_with(None, None);

        manager
            .connect(&tcp_config("A", port), &ConnectOptions::default())
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();
        assert!(matches!(
            next_event(&mut rx).await,
            ConnectionEvent::Connected { .. }
        ));

        peer.write_all(b"hello").await.unwrap();
        let (id, bytes) = next_data_event(&mut rx).await;
        assert_eq!(id, "A");
        assert_eq!(bytes, b"hello");

        let report = manager.send("A", b"ping", None).await.unwrap();
        assert_eq!(report.bytes_sent, 4);
        let mut buf = [0u8; 8];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        let snapshot = manager.get_connection_status("A").unwrap();
        assert_eq!(snapshot.info.status, ConnectionStatus::Connected);
        assert_eq!(snapshot.stats.bytes_received, 5);
        assert_eq!(snapshot.stats.messages_received, 1);
        assert_eq!(snapshot.stats.bytes_sent, 4);
        assert_eq!(snapshot.stats.messages_sent, 1);
        assert!(snapshot.stats.connection_time.is_some());
        assert!(snapshot.stats.last_activity.is_some());

        manager.disconnect("A").await.unwrap();
        assert!(manager.get_connections().is_empty());
    }

    #[tokio::test]
    async fn failed_connect_leaves_no_record() {
        // grab a port with no listener behind it
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let (manager, _rx, _) = manager_with(None, None);
        let mut config = tcp_config("A", port);
        config.timeout_ms = Some(200);

        let started = Instant::now();
        let result = manager.connect(&config, &ConnectOptions::default()).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(manager.get_connections().is_empty());
        assert!(manager.get_connection_status("A").is_none());
    }

    #[tokio::test]
    async fn connected_id_is_rejected_until_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (manager, _rx, _) = manager_with(None, None);

        manager
            .connect(&tcp_config("A", port), &ConnectOptions::default())
            .await
            .unwrap();
        let err = manager
            .connect(&tcp_config("A", port), &ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::AlreadyConnected(_)));

        manager.disconnect("A").await.unwrap();
        manager
            .connect(&tcp_config("A", port), &ConnectOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (manager, _rx, _) = manager_with(None, None);
        manager.disconnect("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn classified_frames_are_captured_not_forwarded() {
        let dir = TempDir::new().unwrap();
        let rule = FrameHeaderRule {
            id: "telemetry".to_string(),
            connection_id: "A".to_string(),
            header_patterns: vec!["AABB".to_string()],
            enabled: true,
        };
        let (manager, mut rx, capture) = manager_with(Some(&dir), Some(rule));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        manager
            .connect(&tcp_config("A", port), &ConnectOptions::default())
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        // matched frame: captured, suppressed from the event stream
        peer.write_all(&[0xAA, 0xBB, 0x01]).await.unwrap();
        // unmatched frame: forwarded
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.write_all(&[0xCC, 0x01]).await.unwrap();

        let (_, bytes) = next_data_event(&mut rx).await;
        assert_eq!(bytes, vec![0xCC, 0x01]);

        // the capture append is fire-and-forget; poll until it lands
        let mut stats = capture.stats().await;
        for _ in 0..50 {
            if stats.total_frames_stored == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            stats = capture.stats().await;
        }
        assert_eq!(stats.total_frames_stored, 1);
        assert_eq!(stats.frame_type_stats.get("telemetry"), Some(&1));

        let path = capture.session().await.file_path.unwrap();
        let content = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(content, "AABB01\n");
    }

    #[tokio::test]
    async fn udp_bind_receive_and_targeted_send() {
        let (manager, mut rx, _) = manager_with(None, None);
        manager
            .connect(&udp_config("U", 0), &ConnectOptions::default())
            .await
            .unwrap();
        let local = manager.local_addr("U").unwrap();
        assert!(matches!(
            next_event(&mut rx).await,
            ConnectionEvent::Connected { .. }
        ));

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"reading", local).await.unwrap();
        let (id, bytes) = next_data_event(&mut rx).await;
        assert_eq!(id, "U");
        assert_eq!(bytes, b"reading");

        let target = format!("127.0.0.1:{}", peer.local_addr().unwrap().port());
        let report = manager.send("U", b"poll", Some(&target)).await.unwrap();
        assert_eq!(report.bytes_sent, 4);
        let mut buf = [0u8; 16];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"poll");
    }

    #[tokio::test]
    async fn peer_close_removes_the_record_and_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (manager, mut rx, _) = manager_with(None, None);

        manager
            .connect(&tcp_config("A", port), &ConnectOptions::default())
            .await
            .unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        drop(peer);

        loop {
            match next_event(&mut rx).await {
                ConnectionEvent::Closed { id } => {
                    assert_eq!(id, "A");
                    break;
                }
                _ => continue,
            }
        }
        assert!(manager.get_connection_status("A").is_none());
    }

    #[test]
    fn udp_target_override_falls_back_per_field() {
        assert_eq!(
            resolve_udp_target(None, "10.0.0.1", 9000).unwrap(),
            ("10.0.0.1".to_string(), 9000)
        );
        assert_eq!(
            resolve_udp_target(Some("10.0.0.2:9100"), "10.0.0.1", 9000).unwrap(),
            ("10.0.0.2".to_string(), 9100)
        );
        assert_eq!(
            resolve_udp_target(Some(":9100"), "10.0.0.1", 9000).unwrap(),
            ("10.0.0.1".to_string(), 9100)
        );
        assert_eq!(
            resolve_udp_target(Some("10.0.0.2"), "10.0.0.1", 9000).unwrap(),
            ("10.0.0.2".to_string(), 9000)
        );
        assert_eq!(
            resolve_udp_target(Some("10.0.0.2:"), "10.0.0.1", 9000).unwrap(),
            ("10.0.0.2".to_string(), 9000)
        );
        assert!(resolve_udp_target(Some("10.0.0.2:nope"), "10.0.0.1", 9000).is_err());
    }
}
