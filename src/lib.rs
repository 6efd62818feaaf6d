pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::Settings;
pub use core::{SyncAnalyzer, SyncCache, SyncEngine, SyncExecutor, SyncRule};
pub use error::{Result, SyncError};
pub use storage::{FileRecord, Storage};
