pub mod capture_store;
pub mod types;

pub use capture_store::CaptureStore;
pub use types::{CaptureSession, StorageStats};
