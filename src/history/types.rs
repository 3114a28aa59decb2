//! On-disk history file format.
//!
//! One JSON document per hour bucket. Field names are camelCase on the wire;
//! `records[i].data` is positional, with positions fixed by the metadata's
//! item `index` assignment for the lifetime of the file.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const HISTORY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelItem {
    pub id: String,
    pub label: String,
    pub data_type: String,
    pub group_id: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelGroup {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub data_items: Vec<ChannelItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyMetadata {
    pub version: u32,
    pub hour_key: String,
    pub groups: Vec<ChannelGroup>,
    pub total_data_items: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One sample row. `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: i64,
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyFile {
    pub metadata: HourlyMetadata,
    pub records: Vec<HistoryRecord>,
}

impl HourlyFile {
    pub fn new(hour_key: &str, groups: &[ChannelGroup], now: DateTime<Utc>) -> Self {
        let total_data_items = groups.iter().map(|g| g.data_items.len()).sum();
        Self {
            metadata: HourlyMetadata {
                version: HISTORY_FORMAT_VERSION,
                hour_key: hour_key.to_string(),
                groups: groups.to_vec(),
                total_data_items,
                created_at: now,
                updated_at: now,
            },
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourFileInfo {
    pub hour_key: String,
    pub compressed: bool,
    pub size_bytes: u64,
    pub record_count: usize,
    pub total_data_items: usize,
    pub updated_at: DateTime<Utc>,
}

/// Directory-wide aggregate. `compression_ratio` is compressed bytes over
/// uncompressed bytes across the compressed files (1.0 when none exist).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStorageStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub earliest_hour: Option<String>,
    pub latest_hour: Option<String>,
    pub compressed_files: usize,
    pub compression_ratio: f64,
}

/// Result of a multi-hour load: whatever loaded plus one message per key that
/// did not. The batch itself never fails.
#[derive(Debug, Default)]
pub struct HourBatch {
    pub data: HashMap<String, HourlyFile>,
    pub errors: Vec<String>,
}
