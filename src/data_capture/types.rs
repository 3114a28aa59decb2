use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate counters for the capture log.
///
/// `current_file_size` is a running estimate (2 hex chars + newline per stored
/// byte payload), not a stat of the file; rotation uses the authoritative
/// on-disk size instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_frames_stored: u64,
    pub total_bytes_stored: u64,
    pub current_file_size: u64,
    pub frame_type_stats: HashMap<String, u64>,
    pub storage_start_time: Option<DateTime<Utc>>,
    pub last_storage_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSession {
    /// Path of the file currently (or most recently) written.
    pub file_path: Option<PathBuf>,
    /// Whether a write stream is open.
    pub is_active: bool,
}
