//! Hour-bucketed telemetry history.
//!
//! Each hour key owns exactly one file under the data directory, either
//! `<hourKey>.json` or `<hourKey>.json.gz` once the hour is closed and
//! compressed. Appends are read-modify-write against the uncompressed file;
//! callers batch samples (see [`super::recorder::HistoryRecorder`]) so the
//! I/O rate is bounded by flush cadence, not sample rate. Hour keys are
//! fixed-width `YYYY-MM-DD-HH`, which makes lexicographic comparison the
//! chronological one; retention cleanup relies on this.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, error, info, warn};
use tokio::fs;
use tokio::sync::Mutex;

use super::types::{
    ChannelGroup, HistoryRecord, HistoryStorageStats, HourBatch, HourFileInfo, HourlyFile,
};
use crate::error_handling::types::{DataFormatError, HistoryError, StorageIOError};

pub fn hour_key_for(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d-%H").to_string()
}

pub fn hour_key_for_millis(ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(hour_key_for)
}

pub struct HistoryStore {
    dir: PathBuf,
    groups: Vec<ChannelGroup>,
    total_data_items: usize,
    // serializes read-modify-write cycles and compress/delete transitions
    gate: Mutex<()>,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(dir: P, groups: Vec<ChannelGroup>) -> Self {
        let total_data_items = groups.iter().map(|g| g.data_items.len()).sum();
        Self {
            dir: dir.as_ref().to_path_buf(),
            groups,
            total_data_items,
            gate: Mutex::new(()),
        }
    }

    pub fn total_data_items(&self) -> usize {
        self.total_data_items
    }

    fn json_path(&self, hour_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hour_key))
    }

    fn gz_path(&self, hour_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json.gz", hour_key))
    }

    /// Appends a batch of records to the uncompressed file for `hour_key`,
    /// creating it with fresh metadata if absent.
    pub async fn append(
        &self,
        hour_key: &str,
        records: &[HistoryRecord],
    ) -> Result<(), HistoryError> {
        for record in records {
            if record.data.len() != self.total_data_items {
                return Err(DataFormatError::RecordArity {
                    expected: self.total_data_items,
                    actual: record.data.len(),
                }
                .into());
            }
        }
        if records.is_empty() {
            return Ok(());
        }

        let _gate = self.gate.lock().await;
        let path = self.json_path(hour_key);
        let mut file = match fs::read(&path).await {
            Ok(bytes) => parse_hourly(hour_key, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.dir)
                    .await
                    .map_err(StorageIOError::DirectoryFailed)?;
                HourlyFile::new(hour_key, &self.groups, Utc::now())
            }
            Err(e) => return Err(StorageIOError::ReadFailed(e).into()),
        };

        file.records.extend_from_slice(records);
        file.metadata.updated_at = Utc::now();
        let bytes = serde_json::to_vec(&file).map_err(|e| {
            StorageIOError::WriteFailed(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&path, bytes)
            .await
            .map_err(StorageIOError::WriteFailed)?;
        debug!(
            "Appended {} record(s) to {} ({} total)",
            records.len(),
            path.display(),
            file.records.len()
        );
        Ok(())
    }

    /// Gzips the hour's file and deletes the original. The write-then-delete
    /// order keeps at most one live representation at any point.
    pub async fn compress(&self, hour_key: &str) -> Result<(), HistoryError> {
        let _gate = self.gate.lock().await;
        let path = self.json_path(hour_key);
        let raw = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageIOError::MissingFile(hour_key.to_string()).into());
            }
            Err(e) => return Err(StorageIOError::ReadFailed(e).into()),
        };

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .map_err(StorageIOError::WriteFailed)?;
        let compressed = encoder.finish().map_err(StorageIOError::WriteFailed)?;

        fs::write(self.gz_path(hour_key), &compressed)
            .await
            .map_err(StorageIOError::WriteFailed)?;
        fs::remove_file(&path)
            .await
            .map_err(StorageIOError::DeleteFailed)?;
        info!(
            "Compressed hour {}: {} -> {} bytes",
            hour_key,
            raw.len(),
            compressed.len()
        );
        Ok(())
    }

    pub async fn is_compressed(&self, hour_key: &str) -> bool {
        fs::metadata(self.gz_path(hour_key)).await.is_ok()
    }

    pub async fn load_hour(&self, hour_key: &str) -> Result<HourlyFile, HistoryError> {
        match fs::read(self.json_path(hour_key)).await {
            Ok(bytes) => parse_hourly(hour_key, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match fs::read(self.gz_path(hour_key)).await {
                    Ok(bytes) => {
                        let raw = gunzip(hour_key, &bytes)?;
                        parse_hourly(hour_key, &raw)
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(StorageIOError::MissingFile(hour_key.to_string()).into())
                    }
                    Err(e) => Err(StorageIOError::ReadFailed(e).into()),
                }
            }
            Err(e) => Err(StorageIOError::ReadFailed(e).into()),
        }
    }

    /// Loads each key independently; a missing or corrupt hour lands in
    /// `errors` without aborting the rest.
    pub async fn load_multiple_hours(&self, hour_keys: &[String]) -> HourBatch {
        let mut batch = HourBatch::default();
        for key in hour_keys {
            match self.load_hour(key).await {
                Ok(file) => {
                    batch.data.insert(key.clone(), file);
                }
                Err(e) => {
                    warn!("Skipping hour {}: {}", key, e);
                    batch.errors.push(format!("{}: {}", key, e));
                }
            }
        }
        batch
    }

    pub async fn get_available_hours(&self) -> Result<Vec<String>, StorageIOError> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(StorageIOError::ReadFailed(e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageIOError::ReadFailed)?
        {
            let name = entry.file_name();
            if let Some((key, _)) = split_hour_file_name(&name.to_string_lossy()) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    pub async fn get_file_info(&self, hour_key: &str) -> Result<HourFileInfo, HistoryError> {
        let compressed = self.is_compressed(hour_key).await;
        let path = if compressed {
            self.gz_path(hour_key)
        } else {
            self.json_path(hour_key)
        };
        let size_bytes = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageIOError::MissingFile(hour_key.to_string()).into());
            }
            Err(e) => return Err(StorageIOError::ReadFailed(e).into()),
        };
        let file = self.load_hour(hour_key).await?;
        Ok(HourFileInfo {
            hour_key: hour_key.to_string(),
            compressed,
            size_bytes,
            record_count: file.records.len(),
            total_data_items: file.metadata.total_data_items,
            updated_at: file.metadata.updated_at,
        })
    }

    pub async fn get_storage_stats(&self) -> Result<HistoryStorageStats, StorageIOError> {
        let mut stats = HistoryStorageStats {
            total_files: 0,
            total_size_bytes: 0,
            earliest_hour: None,
            latest_hour: None,
            compressed_files: 0,
            compression_ratio: 1.0,
        };
        let mut compressed_bytes = 0u64;
        let mut uncompressed_bytes = 0u64;

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(StorageIOError::ReadFailed(e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageIOError::ReadFailed)?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy().to_string();
            let Some((key, compressed)) = split_hour_file_name(&name) else {
                continue;
            };
            let meta = entry
                .metadata()
                .await
                .map_err(StorageIOError::ReadFailed)?;

            stats.total_files += 1;
            stats.total_size_bytes += meta.len();
            let key = key.to_string();
            if stats.earliest_hour.as_deref().map_or(true, |e| key.as_str() < e) {
                stats.earliest_hour = Some(key.clone());
            }
            if stats.latest_hour.as_deref().map_or(true, |l| key.as_str() > l) {
                stats.latest_hour = Some(key.clone());
            }

            if compressed {
                stats.compressed_files += 1;
                compressed_bytes += meta.len();
                match fs::read(entry.path()).await {
                    Ok(bytes) => match gunzip(&key, &bytes) {
                        Ok(raw) => uncompressed_bytes += raw.len() as u64,
                        Err(e) => warn!("Unreadable compressed hour {}: {}", key, e),
                    },
                    Err(e) => warn!("Unreadable compressed hour {}: {}", key, e),
                }
            }
        }

        if uncompressed_bytes > 0 {
            stats.compression_ratio = compressed_bytes as f64 / uncompressed_bytes as f64;
        }
        Ok(stats)
    }

    /// Deletes every hour file lexicographically older than
    /// `now - days_to_keep * 24h`. Returns the number of files removed.
    pub async fn cleanup_old_data(&self, days_to_keep: u32) -> Result<usize, StorageIOError> {
        let cutoff = hour_key_for(Utc::now() - chrono::Duration::days(days_to_keep as i64));
        let _gate = self.gate.lock().await;

        let mut removed = 0usize;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageIOError::ReadFailed(e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageIOError::ReadFailed)?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy().to_string();
            let Some((key, _)) = split_hour_file_name(&name) else {
                continue;
            };
            if key < cutoff.as_str() {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => error!("Failed to remove {}: {}", entry.path().display(), e),
                }
            }
        }
        info!(
            "History cleanup removed {} file(s) older than {}",
            removed, cutoff
        );
        Ok(removed)
    }

    /// Removes whichever representation of the hour exists; an error only
    /// when neither does.
    pub async fn delete_hour_data(&self, hour_key: &str) -> Result<(), StorageIOError> {
        let _gate = self.gate.lock().await;
        let mut removed = false;
        for path in [self.json_path(hour_key), self.gz_path(hour_key)] {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    removed = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageIOError::DeleteFailed(e)),
            }
        }
        if removed {
            Ok(())
        } else {
            Err(StorageIOError::MissingFile(hour_key.to_string()))
        }
    }
}

fn parse_hourly(hour_key: &str, bytes: &[u8]) -> Result<HourlyFile, HistoryError> {
    serde_json::from_slice(bytes)
        .map_err(|e| DataFormatError::MalformedFile(hour_key.to_string(), e.to_string()).into())
}

fn gunzip(hour_key: &str, bytes: &[u8]) -> Result<Vec<u8>, HistoryError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| DataFormatError::MalformedFile(hour_key.to_string(), e.to_string()))?;
    Ok(raw)
}

fn split_hour_file_name(name: &str) -> Option<(&str, bool)> {
    name.strip_suffix(".json.gz")
        .map(|key| (key, true))
        .or_else(|| name.strip_suffix(".json").map(|key| (key, false)))
}
