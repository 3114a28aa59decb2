pub mod history_store;
pub mod recorder;
pub mod types;

pub use history_store::{hour_key_for, hour_key_for_millis, HistoryStore};
pub use recorder::HistoryRecorder;
pub use types::{
    ChannelGroup, ChannelItem, HistoryRecord, HourBatch, HourFileInfo, HourlyFile, HourlyMetadata,
    HistoryStorageStats,
};
