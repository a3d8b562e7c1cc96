//! docstore - a small document storage service.
//!
//! Files are stored as blobs on disk with their metadata in SQLite. All
//! storage work runs on a bounded worker pool, and the file service is
//! exposed over a REST API.

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod file;
pub mod lifecycle;
pub mod logging;
pub mod task;
pub mod validation;
pub mod web;

pub use config::Config;
pub use db::Database;
pub use error::{DocstoreError, Result};
pub use file::{
    BlobStore, Download, DownloadStatus, FileRecord, FileService, UploadRequest, UploadStatus,
};
pub use lifecycle::{Lifecycle, RetentionPolicy};
pub use task::{TaskGateway, TaskHandle};
pub use web::WebServer;
