//! API handlers for the REST adapter.

pub mod file;

pub use file::*;

use crate::file::FileService;

/// Shared state for all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// File service.
    pub files: FileService,
    /// Maximum upload size in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(files: FileService) -> Self {
        let max_upload_size = files.max_file_size();
        Self {
            files,
            max_upload_size,
        }
    }
}
