//! Boundary to the video metadata store. The platform's CRUD surface
//! owns these records; the pipeline only reads them to resolve a video
//! id into a job id and a visibility flag, and the upload caller writes
//! one record per successfully transcoded video.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

const CATALOG_SCHEMA: &str = include_str!("../sql/catalog.sql");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog store path not configured")]
    MissingStore,
    #[error("failed to open catalog {path}: {source}")]
    OpenDatabase {
        source: rusqlite::Error,
        path: PathBuf,
    },
    #[error("catalog query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Serialize)]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    /// Stored filename of the uploaded source; the job id is this name
    /// with the extension stripped.
    pub source_filename: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

pub trait VideoCatalog: Send + Sync {
    fn find(&self, video_id: &str) -> CatalogResult<Option<VideoRecord>>;
    fn upsert(&self, record: &VideoRecord) -> CatalogResult<()>;
    fn set_private(&self, video_id: &str, is_private: bool) -> CatalogResult<bool>;
}

#[derive(Debug, Clone)]
pub struct SqliteVideoCatalogBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteVideoCatalogBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteVideoCatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> CatalogResult<SqliteVideoCatalog> {
        let path = self.path.ok_or(CatalogError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteVideoCatalog { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteVideoCatalog {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteVideoCatalog {
    pub fn builder() -> SqliteVideoCatalogBuilder {
        SqliteVideoCatalogBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> CatalogResult<Self> {
        SqliteVideoCatalogBuilder::new().path(path).build()
    }

    pub fn initialize(&self) -> CatalogResult<()> {
        let conn = self.open()?;
        conn.execute_batch(CATALOG_SCHEMA)?;
        Ok(())
    }

    fn open(&self) -> CatalogResult<Connection> {
        Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            CatalogError::OpenDatabase {
                source,
                path: self.path.clone(),
            }
        })
    }
}

impl VideoCatalog for SqliteVideoCatalog {
    fn find(&self, video_id: &str) -> CatalogResult<Option<VideoRecord>> {
        let conn = self.open()?;
        let record = conn
            .query_row(
                "SELECT id, title, source_filename, is_private, created_at
                 FROM videos WHERE id = ?1",
                params![video_id],
                |row| {
                    Ok(VideoRecord {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        source_filename: row.get(2)?,
                        is_private: row.get::<_, i64>(3)? != 0,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn upsert(&self, record: &VideoRecord) -> CatalogResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO videos (id, title, source_filename, is_private, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 source_filename = excluded.source_filename,
                 is_private = excluded.is_private",
            params![
                record.id,
                record.title,
                record.source_filename,
                record.is_private as i64,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn set_private(&self, video_id: &str, is_private: bool) -> CatalogResult<bool> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE videos SET is_private = ?2 WHERE id = ?1",
            params![video_id, is_private as i64],
        )?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> (tempfile::TempDir, SqliteVideoCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SqliteVideoCatalog::new(dir.path().join("catalog.sqlite")).unwrap();
        catalog.initialize().unwrap();
        (dir, catalog)
    }

    fn record(id: &str) -> VideoRecord {
        VideoRecord {
            id: id.to_string(),
            title: "clip".to_string(),
            source_filename: format!("{id}.mp4"),
            is_private: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn round_trips_records() {
        let (_dir, catalog) = catalog();
        catalog.upsert(&record("v1")).unwrap();
        let found = catalog.find("v1").unwrap().unwrap();
        assert_eq!(found.source_filename, "v1.mp4");
        assert!(!found.is_private);
        assert!(catalog.find("missing").unwrap().is_none());
    }

    #[test]
    fn set_private_flips_visibility() {
        let (_dir, catalog) = catalog();
        catalog.upsert(&record("v1")).unwrap();
        assert!(catalog.set_private("v1", true).unwrap());
        assert!(catalog.find("v1").unwrap().unwrap().is_private);
        assert!(!catalog.set_private("missing", true).unwrap());
    }
}
