//! Read side of the pipeline: resolve a `(video, rung, artifact)`
//! request to a file inside the computed layout and hand back an open
//! stream. Every miss — unknown video, private video, unknown rung,
//! malformed chunk name, absent file — collapses into the same
//! `NotFound`, so existence is never revealed for restricted content.

pub mod http;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;

use crate::catalog::{CatalogError, VideoCatalog};
use crate::ladder::Ladder;
use crate::layout::{StorageLayout, SEGMENT_EXTENSION};

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("artifact not found")]
    NotFound,
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// An artifact ready to stream.
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub file: fs::File,
    pub len: u64,
    pub content_type: &'static str,
}

pub struct DeliveryService {
    ladder: Ladder,
    layout: StorageLayout,
    catalog: Arc<dyn VideoCatalog>,
}

impl DeliveryService {
    pub fn new(ladder: Ladder, layout: StorageLayout, catalog: Arc<dyn VideoCatalog>) -> Self {
        Self {
            ladder,
            layout,
            catalog,
        }
    }

    /// Master playlist for a video.
    pub async fn master(&self, video_id: &str) -> DeliveryResult<Artifact> {
        let job_id = self.resolve_job(video_id)?;
        let path = self.layout.master_playlist_path(&job_id);
        self.open(path, MANIFEST_CONTENT_TYPE).await
    }

    /// Variant manifest for one rung.
    pub async fn manifest(&self, video_id: &str, rung: &str) -> DeliveryResult<Artifact> {
        let job_id = self.resolve_job(video_id)?;
        if self.ladder.get(rung).is_none() {
            return Err(DeliveryError::NotFound);
        }
        let path = self.layout.manifest_path(&job_id, rung);
        self.open(path, MANIFEST_CONTENT_TYPE).await
    }

    /// One chunk of one rung. The chunk name must be exactly the
    /// canonical `<n>.ts` the layout produces; anything else — including
    /// traversal attempts — is rejected before any filesystem access.
    pub async fn segment(
        &self,
        video_id: &str,
        rung: &str,
        segment_name: &str,
    ) -> DeliveryResult<Artifact> {
        let job_id = self.resolve_job(video_id)?;
        if self.ladder.get(rung).is_none() {
            return Err(DeliveryError::NotFound);
        }
        let index = canonical_segment_index(segment_name).ok_or(DeliveryError::NotFound)?;
        let path = self.layout.segment_path(&job_id, rung, index);
        self.open(path, SEGMENT_CONTENT_TYPE).await
    }

    /// Private videos are indistinguishable from absent ones.
    fn resolve_job(&self, video_id: &str) -> DeliveryResult<String> {
        let record = self
            .catalog
            .find(video_id)?
            .filter(|record| !record.is_private)
            .ok_or(DeliveryError::NotFound)?;
        Ok(StorageLayout::job_id_for(&record.source_filename))
    }

    async fn open(&self, path: PathBuf, content_type: &'static str) -> DeliveryResult<Artifact> {
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(DeliveryError::NotFound)
            }
            Err(source) => return Err(DeliveryError::Io { source, path }),
        };
        let metadata = file
            .metadata()
            .await
            .map_err(|source| DeliveryError::Io {
                source,
                path: path.clone(),
            })?;
        if !metadata.is_file() {
            return Err(DeliveryError::NotFound);
        }
        Ok(Artifact {
            path,
            file,
            len: metadata.len(),
            content_type,
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }
}

/// Accept only `<n>.ts` where `<n>` is the canonical decimal rendering
/// of an index. `01.ts`, `a.ts` and `../../etc/passwd` all fail here.
fn canonical_segment_index(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    let index: u64 = stem.parse().ok()?;
    if index.to_string() == stem {
        Some(index)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_segment_names_only() {
        assert_eq!(canonical_segment_index("0.ts"), Some(0));
        assert_eq!(canonical_segment_index("17.ts"), Some(17));
        assert_eq!(canonical_segment_index("01.ts"), None);
        assert_eq!(canonical_segment_index("-1.ts"), None);
        assert_eq!(canonical_segment_index("a.ts"), None);
        assert_eq!(canonical_segment_index("0.mp4"), None);
        assert_eq!(canonical_segment_index("../../etc/passwd"), None);
        assert_eq!(canonical_segment_index("..%2F..%2Fetc%2Fpasswd.ts"), None);
    }
}
