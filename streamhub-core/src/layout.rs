//! Deterministic artifact paths. Every component that touches transcoded
//! output goes through this mapping, so the delivery side can locate any
//! artifact from a job id and rung name alone.
//!
//! For job `J` and rung `R`, rooted at the converted directory:
//!
//! ```text
//! <root>/J/R.mp4              encoded intermediate
//! <root>/J/R_hls/index.m3u8   variant manifest
//! <root>/J/R_hls/<n>.ts       chunk n = 0, 1, 2, ...
//! <root>/J/master.m3u8        master playlist
//! ```
//!
//! Job ids are unique by construction (upload transport assigns unique
//! stored filenames); rung names are unique within the ladder. The
//! mapping is therefore collision-free.

use std::path::{Path, PathBuf};

pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";
pub const VARIANT_MANIFEST_NAME: &str = "index.m3u8";
pub const ENCODED_EXTENSION: &str = "mp4";
pub const SEGMENT_EXTENSION: &str = "ts";

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derive a job id from a stored source filename by stripping the
    /// extension. `video-1712-3456.mp4` -> `video-1712-3456`.
    pub fn job_id_for(filename: &str) -> String {
        match filename.split_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => filename.to_string(),
        }
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    pub fn encoded_path(&self, job_id: &str, rung: &str) -> PathBuf {
        self.job_dir(job_id)
            .join(format!("{rung}.{ENCODED_EXTENSION}"))
    }

    pub fn segment_dir(&self, job_id: &str, rung: &str) -> PathBuf {
        self.job_dir(job_id).join(format!("{rung}_hls"))
    }

    pub fn manifest_path(&self, job_id: &str, rung: &str) -> PathBuf {
        self.segment_dir(job_id, rung).join(VARIANT_MANIFEST_NAME)
    }

    pub fn segment_path(&self, job_id: &str, rung: &str, index: u64) -> PathBuf {
        self.segment_dir(job_id, rung)
            .join(format!("{index}.{SEGMENT_EXTENSION}"))
    }

    pub fn master_playlist_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(MASTER_PLAYLIST_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_deterministic() {
        let layout = StorageLayout::new("/srv/converted");
        assert_eq!(
            layout.manifest_path("job-1", "720p"),
            layout.manifest_path("job-1", "720p")
        );
        assert_eq!(
            layout.encoded_path("job-1", "720p"),
            PathBuf::from("/srv/converted/job-1/720p.mp4")
        );
        assert_eq!(
            layout.manifest_path("job-1", "720p"),
            PathBuf::from("/srv/converted/job-1/720p_hls/index.m3u8")
        );
        assert_eq!(
            layout.segment_path("job-1", "720p", 3),
            PathBuf::from("/srv/converted/job-1/720p_hls/3.ts")
        );
        assert_eq!(
            layout.master_playlist_path("job-1"),
            PathBuf::from("/srv/converted/job-1/master.m3u8")
        );
    }

    #[test]
    fn rungs_within_a_job_never_collide() {
        let layout = StorageLayout::new("/srv/converted");
        let a = layout.segment_dir("job-1", "144p");
        let b = layout.segment_dir("job-1", "360p");
        assert_ne!(a, b);
        assert_ne!(
            layout.job_dir("job-1"),
            layout.job_dir("job-2")
        );
    }

    #[test]
    fn job_id_strips_extension() {
        assert_eq!(StorageLayout::job_id_for("video-17.mp4"), "video-17");
        assert_eq!(StorageLayout::job_id_for("clip.final.mov"), "clip");
        assert_eq!(StorageLayout::job_id_for("noext"), "noext");
    }
}
