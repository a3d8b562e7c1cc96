//! File management module for docstore.
//!
//! This module provides:
//! - Blob storage in a flat directory, keyed by stored name
//! - File metadata records and their repository
//! - HTTP byte-range resolution for partial downloads
//! - The file service that ties these together on the worker pool

mod metadata;
pub mod range;
mod service;
mod storage;

pub use metadata::{FileRecord, FileRepository, NewFileRecord};
pub use range::ByteRange;
pub use service::{
    content_disposition, Download, DownloadStatus, FileService, UploadRequest, UploadStatus,
};
pub use storage::BlobStore;

/// Default maximum file size (10MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
