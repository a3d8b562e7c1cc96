//! Database schema and migrations for docstore.
//!
//! Migrations are applied in order when the database is first opened or
//! upgraded. The `schema_version` table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: file metadata
    r#"
CREATE TABLE file_metadata (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    filename    TEXT NOT NULL,           -- stored name of the blob
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    upload_time TEXT NOT NULL            -- UTC, fixed-width text
);

CREATE INDEX idx_file_metadata_title ON file_metadata(title);
CREATE INDEX idx_file_metadata_upload_time ON file_metadata(upload_time);
"#,
];
