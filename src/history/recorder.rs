use std::sync::Arc;

use log::debug;

use super::history_store::{hour_key_for_millis, HistoryStore};
use super::types::HistoryRecord;
use crate::error_handling::types::{DataFormatError, HistoryError};

/// In-memory batcher in front of [`HistoryStore`].
///
/// Samples accumulate here and hit the disk only on [`flush`](Self::flush),
/// which the owner calls periodically, or when a pushed record's hour key
/// differs from the batch's, in which case the previous hour is flushed first.
/// That keeps memory bounded and every record attributed to the hour it was
/// sampled in, independent of flush cadence.
pub struct HistoryRecorder {
    store: Arc<HistoryStore>,
    current_hour: Option<String>,
    pending: Vec<HistoryRecord>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self {
            store,
            current_hour: None,
            pending: Vec::new(),
        }
    }

    /// Queues one record. Crossing an hour boundary flushes the previous
    /// hour's batch before the record is accepted; if that flush fails the
    /// old batch is kept for retry and the record is rejected.
    pub async fn push(&mut self, record: HistoryRecord) -> Result<(), HistoryError> {
        let key = hour_key_for_millis(record.timestamp)
            .ok_or(DataFormatError::BadTimestamp(record.timestamp))?;
        if self.current_hour.as_deref() != Some(key.as_str()) {
            self.flush().await?;
            debug!("History batch now accumulating hour {}", key);
            self.current_hour = Some(key);
        }
        self.pending.push(record);
        Ok(())
    }

    /// Writes the pending batch to its hour file. Pending records are only
    /// dropped after the append succeeds.
    pub async fn flush(&mut self) -> Result<usize, HistoryError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let Some(key) = self.current_hour.clone() else {
            return Ok(0);
        };
        self.store.append(&key, &self.pending).await?;
        let flushed = self.pending.len();
        self.pending.clear();
        Ok(flushed)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn current_hour(&self) -> Option<&str> {
        self.current_hour.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::types::{ChannelGroup, ChannelItem};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<HistoryStore> {
        Arc::new(HistoryStore::new(
            dir.path(),
            vec![ChannelGroup {
                id: "g".to_string(),
                label: "G".to_string(),
                data_items: vec![ChannelItem {
                    id: "x".to_string(),
                    label: "X".to_string(),
                    data_type: "float".to_string(),
                    group_id: "g".to_string(),
                    index: 0,
                }],
            }],
        ))
    }

    fn record_at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> HistoryRecord {
        HistoryRecord {
            timestamp: Utc
                .with_ymd_and_hms(y, mo, d, h, mi, 0)
                .unwrap()
                .timestamp_millis(),
            data: vec![json!(1.5)],
        }
    }

    #[tokio::test]
    async fn accumulates_without_writing_until_flush() {
        let dir = TempDir::new().unwrap();
        let history = store(&dir);
        let mut recorder = HistoryRecorder::new(Arc::clone(&history));

        recorder.push(record_at(2024, 1, 1, 10, 5)).await.unwrap();
        recorder.push(record_at(2024, 1, 1, 10, 6)).await.unwrap();
        assert_eq!(recorder.pending_len(), 2);
        assert!(history.get_available_hours().await.unwrap().is_empty());

        assert_eq!(recorder.flush().await.unwrap(), 2);
        assert_eq!(recorder.pending_len(), 0);
        let file = history.load_hour("2024-01-01-10").await.unwrap();
        assert_eq!(file.records.len(), 2);
    }

    #[tokio::test]
    async fn hour_boundary_flushes_the_previous_batch() {
        let dir = TempDir::new().unwrap();
        let history = store(&dir);
        let mut recorder = HistoryRecorder::new(Arc::clone(&history));

        recorder.push(record_at(2024, 1, 1, 10, 59)).await.unwrap();
        recorder.push(record_at(2024, 1, 1, 11, 0)).await.unwrap();

        // the 10:xx batch went to disk when 11:00 arrived
        let file = history.load_hour("2024-01-01-10").await.unwrap();
        assert_eq!(file.records.len(), 1);
        assert_eq!(recorder.current_hour(), Some("2024-01-01-11"));
        assert_eq!(recorder.pending_len(), 1);
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut recorder = HistoryRecorder::new(store(&dir));
        assert_eq!(recorder.flush().await.unwrap(), 0);
    }
}
