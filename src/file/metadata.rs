//! File metadata types and repository for docstore.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{QueryBuilder, SqlitePool};

use crate::datetime::{self, day_window, parse_db_timestamp, to_db_timestamp};
use crate::{DocstoreError, Result};

/// Metadata for one uploaded file.
///
/// Only `title`, `description` and `uploadTime` appear in the serialized
/// form; the identity and stored name stay internal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Unique record ID.
    #[serde(skip)]
    pub id: i64,
    /// Name of the blob holding the content.
    #[serde(skip)]
    pub stored_name: String,
    /// Title used for lookups. Not unique.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Upload time (UTC).
    #[serde(rename = "uploadTime", with = "crate::datetime::api_format")]
    pub uploaded_at: NaiveDateTime,
}

/// Data for creating a new record.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub stored_name: String,
    pub title: String,
    pub description: String,
    pub uploaded_at: NaiveDateTime,
}

impl NewFileRecord {
    /// Create a new record stamped with the current time.
    pub fn new(
        stored_name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            stored_name: stored_name.into(),
            title: title.into(),
            description: description.into(),
            uploaded_at: datetime::now(),
        }
    }

    /// Override the upload time.
    pub fn with_uploaded_at(mut self, uploaded_at: NaiveDateTime) -> Self {
        self.uploaded_at = uploaded_at;
        self
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i64,
    filename: String,
    title: String,
    description: String,
    upload_time: String,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = DocstoreError;

    fn try_from(row: FileRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            stored_name: row.filename,
            title: row.title,
            description: row.description,
            uploaded_at: parse_db_timestamp(&row.upload_time)?,
        })
    }
}

fn into_records(rows: Vec<FileRow>) -> Result<Vec<FileRecord>> {
    rows.into_iter().map(FileRecord::try_from).collect()
}

const SELECT_COLUMNS: &str = "SELECT id, filename, title, description, upload_time FROM file_metadata";

/// Repository for file metadata.
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a record and return it with its assigned ID.
    pub async fn create(&self, file: &NewFileRecord) -> Result<FileRecord> {
        let result = sqlx::query(
            "INSERT INTO file_metadata (filename, title, description, upload_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&file.stored_name)
        .bind(&file.title)
        .bind(&file.description)
        .bind(to_db_timestamp(&file.uploaded_at))
        .execute(self.pool)
        .await
        .map_err(|e| DocstoreError::Database(e.to_string()))?;

        if result.rows_affected() != 1 {
            return Err(DocstoreError::Conflict(format!(
                "insert for {:?} affected {} rows",
                file.title,
                result.rows_affected()
            )));
        }

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DocstoreError::Conflict(format!("no record with assigned id {id}")))
    }

    /// Get a record by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| DocstoreError::Database(e.to_string()))?;

        row.map(FileRecord::try_from).transpose()
    }

    /// Get the earliest record with exactly this title.
    pub async fn find_by_title(&self, title: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "{SELECT_COLUMNS} WHERE title = ? ORDER BY id LIMIT 1"
        ))
        .bind(title)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DocstoreError::Database(e.to_string()))?;

        row.map(FileRecord::try_from).transpose()
    }

    /// Search by optional title and optional day.
    ///
    /// An absent title matches any title. A date matches uploads in the
    /// half-open window `[date, date + 1 day)`.
    pub async fn find_by_title_and_date(
        &self,
        title: Option<&str>,
        date: Option<NaiveDateTime>,
    ) -> Result<Vec<FileRecord>> {
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        query.push(" WHERE 1 = 1");

        if let Some(title) = title {
            query.push(" AND title = ");
            query.push_bind(title);
        }

        if let Some(date) = date {
            let (start, end) = day_window(date)?;
            query.push(" AND upload_time >= ");
            query.push_bind(to_db_timestamp(&start));
            if let Some(end) = end {
                query.push(" AND upload_time < ");
                query.push_bind(to_db_timestamp(&end));
            }
        }

        query.push(" ORDER BY id");

        let rows = query
            .build_query_as::<FileRow>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| DocstoreError::Database(e.to_string()))?;

        into_records(rows)
    }

    /// List every record in insertion order.
    pub async fn list_all(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(self.pool)
            .await
            .map_err(|e| DocstoreError::Database(e.to_string()))?;

        into_records(rows)
    }

    /// Count records.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_metadata")
            .fetch_one(self.pool)
            .await
            .map_err(|e| DocstoreError::Database(e.to_string()))?;

        Ok(count)
    }
}
