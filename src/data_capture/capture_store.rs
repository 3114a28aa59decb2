use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use log::{debug, error, info};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::types::{CaptureSession, StorageStats};
use crate::configuration::types::StorageConfig;
use crate::error_handling::types::StorageIOError;

/// Rotating raw capture log.
///
/// Classified frames are appended as one uppercase hex string per line. The
/// open file handle, the stats and the config sit behind one async mutex, so
/// writes to the same file are serialized no matter which reader task spawned
/// the append. Filesystem failures are logged and the operation skipped; they
/// never reach the connection data path.
pub struct CaptureStore {
    state: Mutex<CaptureState>,
}

struct CaptureState {
    config: StorageConfig,
    writer: Option<File>,
    current_path: Option<PathBuf>,
    stats: StorageStats,
}

impl CaptureStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            state: Mutex::new(CaptureState {
                config,
                writer: None,
                current_path: None,
                stats: StorageStats::default(),
            }),
        }
    }

    /// Appends one classified frame. Never fails outward; errors are logged
    /// and the frame is dropped.
    pub async fn store(&self, data: &[u8], rule_id: &str) {
        let mut state = self.state.lock().await;
        if !state.config.enabled {
            return;
        }
        if let Err(e) = Self::write_frame(&mut state, data, rule_id).await {
            error!("Capture write skipped: {}", e);
            return;
        }
        if state.config.enable_rotation {
            if let Err(e) = Self::rotate_if_needed(&mut state).await {
                error!("Capture rotation skipped: {}", e);
            }
        }
    }

    /// Toggling `enabled` false->true re-initializes the write stream;
    /// true->false closes it. Other fields take effect on the next write.
    pub async fn update_config(&self, new_config: StorageConfig) {
        let mut state = self.state.lock().await;
        let was_enabled = state.config.enabled;
        state.config = new_config;
        if state.config.enabled && !was_enabled {
            if let Err(e) = Self::open_new_file(&mut state).await {
                error!("Capture stream init failed: {}", e);
            }
        } else if !state.config.enabled && was_enabled {
            Self::close_stream(&mut state).await;
        }
    }

    /// Closes the stream, deletes the current file and zeroes every counter.
    pub async fn reset_stats(&self) -> Result<(), StorageIOError> {
        let mut state = self.state.lock().await;
        Self::close_stream(&mut state).await;
        if let Some(path) = state.current_path.take() {
            match fs::remove_file(&path).await {
                Ok(()) => info!("Removed capture file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageIOError::DeleteFailed(e)),
            }
        }
        state.stats = StorageStats::default();
        Ok(())
    }

    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        Self::close_stream(&mut state).await;
    }

    pub async fn stats(&self) -> StorageStats {
        self.state.lock().await.stats.clone()
    }

    pub async fn session(&self) -> CaptureSession {
        let state = self.state.lock().await;
        CaptureSession {
            file_path: state.current_path.clone(),
            is_active: state.writer.is_some(),
        }
    }

    pub async fn config(&self) -> StorageConfig {
        self.state.lock().await.config.clone()
    }

    async fn write_frame(
        state: &mut CaptureState,
        data: &[u8],
        rule_id: &str,
    ) -> Result<(), StorageIOError> {
        if state.writer.is_none() {
            Self::open_new_file(state).await?;
        }
        let line = hex_line(data);
        let Some(writer) = state.writer.as_mut() else {
            return Ok(());
        };
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(StorageIOError::WriteFailed)?;

        let now = Utc::now();
        let stats = &mut state.stats;
        stats.total_frames_stored += 1;
        stats.total_bytes_stored += data.len() as u64;
        stats.current_file_size += (data.len() as u64) * 2 + 1;
        *stats
            .frame_type_stats
            .entry(rule_id.to_string())
            .or_insert(0) += 1;
        stats.storage_start_time.get_or_insert(now);
        stats.last_storage_time = Some(now);
        Ok(())
    }

    async fn open_new_file(state: &mut CaptureState) -> Result<(), StorageIOError> {
        fs::create_dir_all(&state.config.capture_dir)
            .await
            .map_err(StorageIOError::DirectoryFailed)?;
        let stamp = Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-");
        let path = state
            .config
            .capture_dir
            .join(format!("business_data_{}.txt", stamp));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(StorageIOError::WriteFailed)?;
        info!("Capture file opened: {}", path.display());
        state.writer = Some(file);
        state.current_path = Some(path);
        state.stats.current_file_size = 0;
        Ok(())
    }

    async fn close_stream(state: &mut CaptureState) {
        if let Some(mut writer) = state.writer.take() {
            let _ = writer.flush().await;
            debug!("Capture stream closed");
        }
    }

    // Rotation reads the on-disk size; the stats estimate is not authoritative.
    async fn rotate_if_needed(state: &mut CaptureState) -> Result<(), StorageIOError> {
        let Some(path) = state.current_path.clone() else {
            return Ok(());
        };
        let meta = fs::metadata(&path)
            .await
            .map_err(StorageIOError::ReadFailed)?;
        let limit = state.config.max_file_size * 1024 * 1024;
        if meta.len() < limit {
            return Ok(());
        }

        info!(
            "Rotating capture file {} ({} bytes on disk)",
            path.display(),
            meta.len()
        );
        Self::close_stream(state).await;
        state.current_path = None;
        Self::prune_rotated(&state.config.capture_dir, state.config.rotation_count).await?;
        Self::open_new_file(state).await
    }

    async fn prune_rotated(dir: &Path, keep: usize) -> Result<(), StorageIOError> {
        let mut entries = fs::read_dir(dir).await.map_err(StorageIOError::ReadFailed)?;
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageIOError::ReadFailed)?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("business_data_") || !name.ends_with(".txt") {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(StorageIOError::ReadFailed)?;
            let mtime = meta
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            files.push((mtime, entry.path()));
        }

        files.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path) in files.iter().skip(keep) {
            match fs::remove_file(path).await {
                Ok(()) => debug!("Pruned rotated capture file {}", path.display()),
                Err(e) => error!("Failed to prune {}: {}", path.display(), e),
            }
        }
        Ok(())
    }
}

fn hex_line(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut line = String::with_capacity(data.len() * 2 + 1);
    for byte in data {
        let _ = write!(line, "{:02X}", byte);
    }
    line.push('\n');
    line
}
