//! Wires the pipeline together.
//!
//! One `Controller` is built at startup from the loaded [`Config`] and owns
//! every service object: capture store, history store + recorder, classifier
//! and connection manager. Collaborators receive references; there is no
//! global state. `run` connects the configured links, drains connection
//! events, accepts externally produced history records over an mpsc channel,
//! and drives periodic maintenance (batch flush, compression of closed hours,
//! retention cleanup).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::MissedTickBehavior;

use crate::configuration::Config;
use crate::connection_management::{ConnectionEvent, ConnectionManager};
use crate::data_capture::CaptureStore;
use crate::error_handling::types::ConfigError;
use crate::frame_classification::{CompiledRule, FrameClassifier};
use crate::history::{hour_key_for, HistoryRecord, HistoryRecorder, HistoryStore};

pub struct Controller {
    config: Config,
    manager: Arc<ConnectionManager>,
    capture: Arc<CaptureStore>,
    history: Arc<HistoryStore>,
    recorder: HistoryRecorder,
    event_rx: Receiver<ConnectionEvent>,
    sample_rx: Receiver<HistoryRecord>,
    sample_tx: Sender<HistoryRecord>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let capture = Arc::new(CaptureStore::new(config.storage.clone()));

        let rule = match config.storage.rule.as_ref() {
            Some(rule) => Some(CompiledRule::compile(rule).map_err(ConfigError::Invalid)?),
            None => None,
        };
        let classifier = FrameClassifier::with_rule(rule);

        let (event_tx, event_rx) = mpsc::channel(256);
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&capture),
            classifier,
            event_tx,
        ));

        let history = Arc::new(HistoryStore::new(
            &config.history.data_dir,
            config.history.groups.clone(),
        ));
        let recorder = HistoryRecorder::new(Arc::clone(&history));
        let (sample_tx, sample_rx) = mpsc::channel(1024);

        Ok(Self {
            config,
            manager,
            capture,
            history,
            recorder,
            event_rx,
            sample_rx,
            sample_tx,
        })
    }

    /// Handle for sampling loops that assemble structured records.
    pub fn sample_sender(&self) -> Sender<HistoryRecord> {
        self.sample_tx.clone()
    }

    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }

    pub fn capture(&self) -> Arc<CaptureStore> {
        Arc::clone(&self.capture)
    }

    pub fn history(&self) -> Arc<HistoryStore> {
        Arc::clone(&self.history)
    }

    pub async fn run(mut self) {
        for entry in &self.config.connections {
            match self.manager.connect(&entry.network, &entry.options).await {
                Ok(()) => {}
                // a dead device must not take the daemon down; the operator reconnects
                Err(e) => error!("[{}] initial connect failed: {}", entry.network.id, e),
            }
        }

        let mut maintenance = tokio::time::interval(Duration::from_secs(
            self.config.history.flush_interval_secs.max(1),
        ));
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => log_event(&event),
                    None => break,
                },
                sample = self.sample_rx.recv() => {
                    if let Some(record) = sample {
                        if let Err(e) = self.recorder.push(record).await {
                            error!("History sample rejected: {}", e);
                        }
                    }
                },
                _ = maintenance.tick() => self.run_maintenance().await,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.manager.shutdown_all().await;
        if let Err(e) = self.recorder.flush().await {
            error!("Final history flush failed: {}", e);
        }
        self.capture.close().await;
        info!("Controller stopped");
    }

    async fn run_maintenance(&mut self) {
        match self.recorder.flush().await {
            Ok(0) => {}
            Ok(n) => debug!("Flushed {} history record(s)", n),
            Err(e) => error!("History flush failed: {}", e),
        }

        if self.history.total_data_items() == 0 {
            return;
        }
        let current = hour_key_for(Utc::now());
        match self.history.get_available_hours().await {
            Ok(hours) => {
                for hour in hours {
                    if hour < current && !self.history.is_compressed(&hour).await {
                        if let Err(e) = self.history.compress(&hour).await {
                            warn!("Compression of hour {} skipped: {}", hour, e);
                        }
                    }
                }
            }
            Err(e) => warn!("History scan skipped: {}", e),
        }
        if let Err(e) = self
            .history
            .cleanup_old_data(self.config.history.retention_days)
            .await
        {
            warn!("History cleanup skipped: {}", e);
        }
    }
}

fn log_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected { id } => info!("[{}] connected", id),
        ConnectionEvent::StatusChanged { id, status } => {
            debug!("[{}] status -> {:?}", id, status)
        }
        ConnectionEvent::Data { id, bytes } => {
            trace!("[{}] {} byte(s) for display", id, bytes.len())
        }
        ConnectionEvent::Error { id, message } => error!("[{}] connection error: {}", id, message),
        ConnectionEvent::Closed { id } => info!("[{}] closed", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::config::ConnectionEntry;
    use crate::configuration::types::{
        ConnectOptions, FrameHeaderRule, NetworkConnectionConfig, StorageConfig, TransportKind,
    };

    fn base_config() -> Config {
        Config {
            connections: vec![ConnectionEntry {
                network: NetworkConnectionConfig {
                    id: "plc-1".to_string(),
                    transport: TransportKind::Tcp,
                    host: "127.0.0.1".to_string(),
                    port: 502,
                    timeout_ms: Some(100),
                },
                options: ConnectOptions::default(),
            }],
            storage: StorageConfig::default(),
            history: Default::default(),
        }
    }

    #[test]
    fn builds_services_from_config() {
        let controller = Controller::new(base_config()).unwrap();
        assert!(controller.manager().get_connections().is_empty());
        assert_eq!(controller.history().total_data_items(), 0);
    }

    #[test]
    fn rejects_an_invalid_capture_rule() {
        let mut config = base_config();
        config.storage.rule = Some(FrameHeaderRule {
            id: "bad".to_string(),
            connection_id: String::new(),
            header_patterns: vec!["GG".to_string()],
            enabled: true,
        });
        match Controller::new(config) {
            Err(ConfigError::Invalid(errors)) => assert!(errors.len() >= 2),
            other => panic!("expected invalid-config error, got ok={}", other.is_ok()),
        }
    }
}
