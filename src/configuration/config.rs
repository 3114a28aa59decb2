use std::fs;
use std::path::Path;

use log::{error, info};
use serde::{Deserialize, Serialize};

use super::types::{ConnectOptions, HistoryConfig, NetworkConnectionConfig, StorageConfig};
use crate::error_handling::types::{ConfigError, ValidationError};
use crate::frame_classification::classifier::validate_rule;

/// One configured link: the network config plus per-transport socket options,
/// flattened so a TOML table reads naturally:
///
/// ```toml
/// [[connections]]
/// id = "plc-1"
/// type = "tcp"
/// host = "192.168.0.10"
/// port = 502
/// [connections.options.tcp]
/// no_delay = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    #[serde(flatten)]
    pub network: NetworkConnectionConfig,
    #[serde(default)]
    pub options: ConnectOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            error!("Failed to read config file {}: {}", path.display(), e);
            ConfigError::IoError(e)
        })?;
        let config = Self::from_toml_str(&raw)?;
        info!(
            "Loaded configuration from {} ({} connection(s))",
            path.display(),
            config.connections.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Collects every violation instead of stopping at the first one.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.connections.is_empty() {
            errors.push(ValidationError::EmptyConnectionPool);
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.connections {
            if !seen.insert(entry.network.id.clone()) {
                errors.push(ValidationError::DuplicateConnectionId(
                    entry.network.id.clone(),
                ));
            }
            if entry.network.port == 0 {
                errors.push(ValidationError::BadPort(entry.network.id.clone()));
            }
        }

        if let Some(ref rule) = self.storage.rule {
            errors.extend(validate_rule(rule).errors);
        }

        let groups = &self.history.groups;
        if !groups.is_empty() && groups.iter().all(|g| g.data_items.is_empty()) {
            errors.push(ValidationError::EmptyChannelLayout);
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::TransportKind;

    const SAMPLE: &str = r#"
        [[connections]]
        id = "plc-1"
        type = "tcp"
        host = "192.168.0.10"
        port = 502
        timeout_ms = 2000

        [connections.options.tcp]
        no_delay = true

        [[connections]]
        id = "meter-1"
        type = "udp"
        host = "0.0.0.0"
        port = 9500

        [storage]
        enabled = true
        max_file_size = 5
        rotation_count = 3

        [storage.rule]
        id = "modbus-poll"
        connection_id = "plc-1"
        header_patterns = ["AABB", "AACC"]
        enabled = true

        [history]
        flush_interval_secs = 10
        retention_days = 7

        [[history.groups]]
        id = "power"
        label = "Power"

        # channel layout keys are camelCase, matching the history file format
        [[history.groups.dataItems]]
        id = "v1"
        label = "Voltage L1"
        dataType = "float"
        groupId = "power"
        index = 0
    "#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[0].network.transport, TransportKind::Tcp);
        assert_eq!(config.connections[0].network.timeout_ms(), 2000);
        assert_eq!(config.connections[0].options.tcp.no_delay, Some(true));
        assert_eq!(config.connections[1].network.transport, TransportKind::Udp);
        // unspecified timeout falls back to the 5000 ms default
        assert_eq!(config.connections[1].network.timeout_ms(), 5000);
        assert!(config.storage.enabled);
        assert_eq!(config.storage.max_file_size, 5);
        let rule = config.storage.rule.as_ref().unwrap();
        assert_eq!(rule.header_patterns.len(), 2);
        assert_eq!(config.history.groups[0].data_items[0].index, 0);
    }

    #[test]
    fn rejects_duplicate_connection_ids() {
        let raw = r#"
            [[connections]]
            id = "a"
            type = "tcp"
            host = "127.0.0.1"
            port = 1000

            [[connections]]
            id = "a"
            type = "udp"
            host = "127.0.0.1"
            port = 1001
        "#;
        match Config::from_toml_str(raw) {
            Err(ConfigError::Invalid(errors)) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ValidationError::DuplicateConnectionId(id) if id == "a")));
            }
            other => panic!("expected validation failure, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn rejects_empty_connection_list() {
        match Config::from_toml_str("") {
            Err(ConfigError::Invalid(errors)) => {
                assert!(errors.contains(&ValidationError::EmptyConnectionPool));
            }
            other => panic!("expected validation failure, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn collects_rule_errors_from_storage_section() {
        let raw = r#"
            [[connections]]
            id = "a"
            type = "tcp"
            host = "127.0.0.1"
            port = 1000

            [storage]
            enabled = true

            [storage.rule]
            id = "bad"
            connection_id = ""
            header_patterns = ["ABC"]
            enabled = true
        "#;
        match Config::from_toml_str(raw) {
            Err(ConfigError::Invalid(errors)) => {
                assert!(errors.contains(&ValidationError::EmptyConnectionId));
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ValidationError::OddPatternLength(0, p) if p == "ABC")));
            }
            other => panic!("expected validation failure, got {:?}", other.is_ok()),
        }
    }
}
