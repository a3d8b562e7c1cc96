//! File service for docstore.
//!
//! The service is the boundary callers talk to. Each operation validates
//! its free-text inputs, then hands the actual work to the
//! [`TaskGateway`]. Both steps can fail immediately: with
//! [`DocstoreError::Validation`] before anything is queued, or with
//! [`DocstoreError::Overloaded`] when the pool refuses the unit. Everything
//! after that is reported through the returned [`TaskHandle`].

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::datetime;
use crate::db::Database;
use crate::task::{TaskGateway, TaskHandle};
use crate::validation::{ensure_safe, stored_name_for};
use crate::{DocstoreError, Result};

use super::metadata::{FileRecord, FileRepository, NewFileRecord};
use super::range::{self, ByteRange};
use super::storage::BlobStore;
use super::DEFAULT_MAX_FILE_SIZE;

/// Request data for file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Client-supplied filename. Only the last path component is kept.
    pub filename: String,
    pub title: String,
    pub description: String,
    pub content: Vec<u8>,
}

impl UploadRequest {
    /// Create a new upload request with an empty description.
    pub fn new(filename: impl Into<String>, title: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            title: title.into(),
            description: String::new(),
            content,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Outcome of an upload.
///
/// Storage failures are not reported in detail to the caller; they are
/// logged and collapse into [`UploadStatus::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Uploaded => "File uploaded successfully",
            Self::Failed => "Failed to upload file",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Uploaded)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome class of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Ok,
    PartialContent,
    NotFound,
    RangeNotSatisfiable,
}

impl DownloadStatus {
    /// Matching HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::PartialContent => 206,
            Self::NotFound => 404,
            Self::RangeNotSatisfiable => 416,
        }
    }
}

/// Result of a download by title.
#[derive(Debug, Clone)]
pub struct Download {
    pub status: DownloadStatus,
    /// Stored name of the blob, when one was found.
    pub filename: Option<String>,
    /// `attachment; filename=...` value, set for successful reads.
    pub content_disposition: Option<String>,
    /// `bytes s-e/L` for partial reads, `bytes */L` for unsatisfiable ones.
    pub content_range: Option<String>,
    /// Size of the whole blob, when known.
    pub total_size: Option<u64>,
    pub body: Vec<u8>,
}

impl Download {
    fn found(filename: &str, range: ByteRange, body: Vec<u8>) -> Self {
        let (status, total) = match range {
            ByteRange::Full { length } => (DownloadStatus::Ok, length),
            ByteRange::Partial { total, .. } => (DownloadStatus::PartialContent, total),
        };
        Self {
            status,
            filename: Some(filename.to_string()),
            content_disposition: Some(content_disposition(filename)),
            content_range: range.content_range(),
            total_size: Some(total),
            body,
        }
    }

    fn not_found() -> Self {
        Self {
            status: DownloadStatus::NotFound,
            filename: None,
            content_disposition: None,
            content_range: None,
            total_size: None,
            body: Vec::new(),
        }
    }

    fn range_not_satisfiable(filename: &str, size: u64) -> Self {
        Self {
            status: DownloadStatus::RangeNotSatisfiable,
            filename: Some(filename.to_string()),
            content_disposition: None,
            content_range: Some(format!("bytes */{size}")),
            total_size: Some(size),
            body: Vec::new(),
        }
    }
}

/// Build a `Content-Disposition: attachment` value for a filename.
///
/// Non-ASCII names and names with quotes or backslashes get an RFC 5987
/// `filename*` parameter next to an ASCII-only fallback.
pub fn content_disposition(filename: &str) -> String {
    let needs_encoding =
        !filename.is_ascii() || filename.chars().any(|c| c.is_control() || c == '"' || c == '\\');

    if !needs_encoding {
        return format!("attachment; filename=\"{filename}\"");
    }

    let fallback: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if !c.is_ascii() => '_',
            _ => c,
        })
        .collect();
    let encoded = urlencoding::encode(filename);

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

struct ServiceInner {
    db: Database,
    blobs: BlobStore,
    gateway: TaskGateway,
}

/// File service for uploading, downloading and searching files.
///
/// Cloning is cheap; clones share the same database, storage and pool.
#[derive(Clone)]
pub struct FileService {
    inner: Arc<ServiceInner>,
    max_file_size: u64,
}

impl FileService {
    /// Create a new FileService.
    pub fn new(db: Database, blobs: BlobStore, gateway: TaskGateway) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                db,
                blobs,
                gateway,
            }),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Set the maximum accepted upload size in bytes.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Get the maximum accepted upload size in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.inner.blobs
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Store a new file and its metadata.
    ///
    /// The blob is written first. If recording the metadata then fails, the
    /// blob is deleted again so no orphan is left behind.
    pub fn save(&self, request: UploadRequest) -> Result<TaskHandle<UploadStatus>> {
        ensure_safe("title", Some(&request.title))?;
        ensure_safe("description", Some(&request.description))?;
        let stored_name = stored_name_for(&request.filename)?;

        let size = request.content.len() as u64;
        if size > self.max_file_size {
            return Err(DocstoreError::Validation(format!(
                "file is too large ({size} bytes, limit {})",
                self.max_file_size
            )));
        }

        let inner = Arc::clone(&self.inner);
        self.inner.gateway.submit("save", move || async move {
            let status = match inner.store(&stored_name, &request).await {
                Ok(record) => {
                    info!(id = record.id, title = %record.title, stored_name = %record.stored_name, size, "File uploaded");
                    UploadStatus::Uploaded
                }
                Err(e) => {
                    error!(title = %request.title, stored_name = %stored_name, error = %e, "File upload failed");
                    UploadStatus::Failed
                }
            };
            Ok(status)
        })
    }

    /// Fetch the content of the earliest file with this title.
    ///
    /// `range` is the raw value of an HTTP `Range` header, if any.
    pub fn load_by_title(&self, title: &str, range: Option<&str>) -> Result<TaskHandle<Download>> {
        ensure_safe("title", Some(title))?;

        let inner = Arc::clone(&self.inner);
        let title = title.to_string();
        let range = range.map(str::to_string);
        self.inner
            .gateway
            .submit("load", move || async move { inner.load(&title, range.as_deref()).await })
    }

    /// List every record in insertion order.
    pub fn list_all(&self) -> Result<TaskHandle<Vec<FileRecord>>> {
        let inner = Arc::clone(&self.inner);
        self.inner.gateway.submit("list", move || async move {
            FileRepository::new(inner.db.pool()).list_all().await
        })
    }

    /// Get the metadata of the earliest file with this title.
    pub fn get_details(&self, title: &str) -> Result<TaskHandle<Option<FileRecord>>> {
        ensure_safe("title", Some(title))?;

        let inner = Arc::clone(&self.inner);
        let title = title.to_string();
        self.inner.gateway.submit("details", move || async move {
            FileRepository::new(inner.db.pool())
                .find_by_title(&title)
                .await
        })
    }

    /// Find the titles of files matching an optional title and optional day.
    pub fn search(
        &self,
        title: Option<&str>,
        date: Option<NaiveDateTime>,
    ) -> Result<TaskHandle<Vec<String>>> {
        ensure_safe("title", title)?;
        if let Some(date) = date {
            datetime::day_window(date)?;
        }

        let inner = Arc::clone(&self.inner);
        let title = title.map(str::to_string);
        self.inner.gateway.submit("search", move || async move {
            let records = FileRepository::new(inner.db.pool())
                .find_by_title_and_date(title.as_deref(), date)
                .await?;
            debug!(matches = records.len(), "Search complete");
            Ok(records.into_iter().map(|r| r.title).collect())
        })
    }
}

impl ServiceInner {
    async fn store(&self, stored_name: &str, request: &UploadRequest) -> Result<FileRecord> {
        self.blobs.write(stored_name, &request.content).await?;

        let new_record = NewFileRecord::new(stored_name, &request.title, &request.description);
        match FileRepository::new(self.db.pool()).create(&new_record).await {
            Ok(record) => Ok(record),
            Err(e) => {
                match self.blobs.delete(stored_name).await {
                    Ok(_) => debug!(stored_name, "Removed blob after failed metadata insert"),
                    Err(cleanup) => {
                        warn!(stored_name, error = %cleanup, "Could not remove orphaned blob")
                    }
                }
                Err(e)
            }
        }
    }

    async fn load(&self, title: &str, range_header: Option<&str>) -> Result<Download> {
        let Some(record) = FileRepository::new(self.db.pool())
            .find_by_title(title)
            .await?
        else {
            debug!(title, "No file with this title");
            return Ok(Download::not_found());
        };
        let name = record.stored_name.as_str();

        let size = match self.blobs.size(name).await {
            Ok(size) => size,
            Err(DocstoreError::NotFound(_)) => {
                warn!(title, stored_name = name, "Metadata points at a missing blob");
                return Ok(Download::not_found());
            }
            Err(e) => return Err(e),
        };

        let window = match range::resolve(range_header, size) {
            Ok(window) => window,
            Err(DocstoreError::RangeNotSatisfiable { reason, .. }) => {
                debug!(title, range = ?range_header, %reason, "Range not satisfiable");
                return Ok(Download::range_not_satisfiable(name, size));
            }
            Err(e) => return Err(e),
        };

        let body = if window.is_partial() {
            self.blobs
                .read_range(name, window.start(), window.length())
                .await
        } else {
            self.blobs.read_all(name).await
        };

        match body {
            Ok(body) => Ok(Download::found(name, window, body)),
            Err(DocstoreError::NotFound(_)) => Ok(Download::not_found()),
            // The blob changed size between the size check and the read.
            Err(DocstoreError::RangeOutOfBounds { size, .. }) => {
                Ok(Download::range_not_satisfiable(name, size))
            }
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for FileService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileService")
            .field("blobs", &self.inner.blobs)
            .field("gateway", &self.inner.gateway)
            .field("max_file_size", &self.max_file_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use tempfile::TempDir;

    async fn setup() -> (FileService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let blobs = BlobStore::new(temp_dir.path().join("files"));
        blobs.ensure_root().await.unwrap();
        let gateway = TaskGateway::new(&ExecutorConfig::new(2, 4, 16)).unwrap();
        (FileService::new(db, blobs, gateway), temp_dir)
    }

    async fn upload(service: &FileService, filename: &str, title: &str, content: &[u8]) -> UploadStatus {
        service
            .save(UploadRequest::new(filename, title, content.to_vec()))
            .unwrap()
            .await
            .unwrap()
    }

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("report.txt"),
            "attachment; filename=\"report.txt\""
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("テスト.txt");
        assert!(value.starts_with("attachment; filename=\"___.txt\"; filename*=UTF-8''"));
        assert!(value.contains("%E3%83%86"));
    }

    #[test]
    fn test_content_disposition_special_chars() {
        let value = content_disposition("a\"b\\c.txt");
        assert!(value.starts_with("attachment; filename=\"a_b_c.txt\""));
        assert!(value.contains("filename*=UTF-8''"));
    }

    #[test]
    fn test_upload_status_messages() {
        assert_eq!(UploadStatus::Uploaded.to_string(), "File uploaded successfully");
        assert_eq!(UploadStatus::Failed.to_string(), "Failed to upload file");
        assert!(UploadStatus::Uploaded.is_success());
        assert!(!UploadStatus::Failed.is_success());
    }

    #[test]
    fn test_download_status_codes() {
        assert_eq!(DownloadStatus::Ok.http_status(), 200);
        assert_eq!(DownloadStatus::PartialContent.http_status(), 206);
        assert_eq!(DownloadStatus::NotFound.http_status(), 404);
        assert_eq!(DownloadStatus::RangeNotSatisfiable.http_status(), 416);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (service, _temp) = setup().await;

        let status = upload(&service, "report.txt", "Q1", b"hello").await;
        assert_eq!(status, UploadStatus::Uploaded);

        let download = service.load_by_title("Q1", None).unwrap().await.unwrap();
        assert_eq!(download.status, DownloadStatus::Ok);
        assert_eq!(download.body, b"hello");
        assert_eq!(download.filename.as_deref(), Some("report.txt"));
        assert_eq!(
            download.content_disposition.as_deref(),
            Some("attachment; filename=\"report.txt\"")
        );
        assert!(download.content_range.is_none());
    }

    #[tokio::test]
    async fn test_save_keeps_last_path_component() {
        let (service, _temp) = setup().await;

        upload(&service, "../../etc/passwd", "P", b"x").await;
        assert!(service.blobs().exists("passwd").await);
    }

    #[tokio::test]
    async fn test_save_duplicate_stored_name_fails() {
        let (service, _temp) = setup().await;

        assert_eq!(upload(&service, "a.txt", "First", b"1").await, UploadStatus::Uploaded);
        assert_eq!(upload(&service, "a.txt", "Second", b"2").await, UploadStatus::Failed);

        // Neither the blob nor the first record were touched.
        assert_eq!(service.blobs().read_all("a.txt").await.unwrap(), b"1");
        let records = service.list_all().unwrap().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "First");
    }

    #[tokio::test]
    async fn test_save_rejects_unsafe_input_before_io() {
        let (service, _temp) = setup().await;

        let result = service.save(UploadRequest::new("a.txt", "x'; DROP TABLE t; --", vec![1]));
        assert!(matches!(result, Err(DocstoreError::Validation(_))));

        let result = service.save(
            UploadRequest::new("b.txt", "ok", vec![1]).with_description("union all"),
        );
        assert!(matches!(result, Err(DocstoreError::Validation(_))));

        assert!(!service.blobs().exists("a.txt").await);
        assert!(!service.blobs().exists("b.txt").await);
    }

    #[tokio::test]
    async fn test_save_rejects_oversized_file() {
        let (service, _temp) = setup().await;
        let service = service.with_max_file_size(4);

        let result = service.save(UploadRequest::new("big.bin", "Big", vec![0; 5]));
        assert!(matches!(result, Err(DocstoreError::Validation(_))));

        let status = service
            .save(UploadRequest::new("small.bin", "Small", vec![0; 4]))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(status, UploadStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_save_removes_blob_when_metadata_fails() {
        let (service, _temp) = setup().await;
        service.database().close().await;

        let status = upload(&service, "orphan.txt", "Orphan", b"data").await;
        assert_eq!(status, UploadStatus::Failed);
        assert!(!service.blobs().exists("orphan.txt").await);
    }

    #[tokio::test]
    async fn test_load_missing_title() {
        let (service, _temp) = setup().await;

        let download = service.load_by_title("Nope", None).unwrap().await.unwrap();
        assert_eq!(download.status, DownloadStatus::NotFound);
        assert!(download.body.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_blob_is_not_found() {
        let (service, _temp) = setup().await;
        upload(&service, "gone.txt", "Gone", b"x").await;
        service.blobs().delete("gone.txt").await.unwrap();

        let download = service.load_by_title("Gone", None).unwrap().await.unwrap();
        assert_eq!(download.status, DownloadStatus::NotFound);
    }

    #[tokio::test]
    async fn test_load_partial() {
        let (service, _temp) = setup().await;
        let content: Vec<u8> = (0..100u8).collect();
        upload(&service, "data.bin", "Data", &content).await;

        let download = service
            .load_by_title("Data", Some("bytes=0-49"))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(download.status, DownloadStatus::PartialContent);
        assert_eq!(download.body, &content[..50]);
        assert_eq!(download.content_range.as_deref(), Some("bytes 0-49/100"));
        assert_eq!(download.total_size, Some(100));

        let download = service
            .load_by_title("Data", Some("bytes=-10"))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(download.body, &content[90..]);
        assert_eq!(download.content_range.as_deref(), Some("bytes 90-99/100"));
    }

    #[tokio::test]
    async fn test_load_unsatisfiable_range() {
        let (service, _temp) = setup().await;
        upload(&service, "data.bin", "Data", &[0u8; 100]).await;

        for header in ["bytes=150-200", "bytes=abc", "bytes=-0"] {
            let download = service
                .load_by_title("Data", Some(header))
                .unwrap()
                .await
                .unwrap();
            assert_eq!(download.status, DownloadStatus::RangeNotSatisfiable, "{header}");
            assert_eq!(download.content_range.as_deref(), Some("bytes */100"));
            assert!(download.body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_load_rejects_unsafe_title() {
        let (service, _temp) = setup().await;

        let result = service.load_by_title("x'; DROP TABLE t; --", None);
        assert!(matches!(result, Err(DocstoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_details() {
        let (service, _temp) = setup().await;
        service
            .save(UploadRequest::new("r.txt", "Report", b"x".to_vec()).with_description("yearly"))
            .unwrap()
            .await
            .unwrap();

        let record = service.get_details("Report").unwrap().await.unwrap().unwrap();
        assert_eq!(record.description, "yearly");

        assert!(service.get_details("Other").unwrap().await.unwrap().is_none());
        assert!(matches!(
            service.get_details("drop"),
            Err(DocstoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_search() {
        let (service, _temp) = setup().await;
        upload(&service, "a.txt", "Alpha", b"a").await;
        upload(&service, "b.txt", "Beta", b"b").await;

        let titles = service.search(Some("Alpha"), None).unwrap().await.unwrap();
        assert_eq!(titles, vec!["Alpha"]);

        let titles = service.search(None, None).unwrap().await.unwrap();
        assert_eq!(titles, vec!["Alpha", "Beta"]);

        let records = service.list_all().unwrap().await.unwrap();
        let day = records[0].uploaded_at.date().and_hms_opt(0, 0, 0).unwrap();
        let titles = service.search(Some("Alpha"), Some(day)).unwrap().await.unwrap();
        assert_eq!(titles, vec!["Alpha"]);

        let long_ago = day - chrono::Duration::days(365);
        let titles = service.search(None, Some(long_ago)).unwrap().await.unwrap();
        assert!(titles.is_empty());

        assert!(matches!(
            service.search(Some("a;b"), None),
            Err(DocstoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_search_rejects_unstorable_date() {
        let (service, _temp) = setup().await;
        upload(&service, "a.txt", "Alpha", b"a").await;

        let far_future = chrono::NaiveDate::MAX.and_hms_opt(0, 0, 0).unwrap();
        assert!(matches!(
            service.search(None, Some(far_future)),
            Err(DocstoreError::Validation(_))
        ));
        assert!(matches!(
            service.search(None, Some(NaiveDateTime::MAX)),
            Err(DocstoreError::Validation(_))
        ));
    }
}
