//! Adaptive-bitrate transcoding pipeline.
//!
//! One job fans out into one encode -> segment chain per ladder rung.
//! Chains run concurrently and never communicate; the orchestrator
//! waits on all of them before the job completes, so a failed rung
//! costs exactly one rendition and nothing else.

mod error;
mod types;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::TranscoderSection;
use crate::ladder::{Ladder, Rung};
use crate::layout::{StorageLayout, SEGMENT_EXTENSION, VARIANT_MANIFEST_NAME};

pub use error::{TranscodeError, TranscodeResult};
pub use types::{JobStatus, RungResult, RungStage, RungState, TranscodeJob};

/// Seam between the pipeline and the external encoding engine. Tests
/// substitute an executor that synthesizes engine output or fails on
/// demand.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> io::Result<std::process::Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> io::Result<std::process::Output> {
        command.output().await
    }
}

pub struct Transcoder {
    ladder: Ladder,
    layout: StorageLayout,
    config: TranscoderSection,
    executor: Arc<dyn CommandExecutor>,
}

impl Transcoder {
    pub fn new(ladder: Ladder, layout: StorageLayout, config: TranscoderSection) -> Self {
        Self {
            ladder,
            layout,
            config,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn ladder(&self) -> &Ladder {
        &self.ladder
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Run one full job. Fails fast with [`TranscodeError::SourceUnreadable`]
    /// before creating any output; afterwards every per-rung failure is
    /// captured inside the returned job, never thrown. The orchestrator
    /// does not retry and cannot be cancelled mid-job.
    pub async fn run_job(
        &self,
        source_path: &Path,
        job_id: &str,
    ) -> TranscodeResult<TranscodeJob> {
        let started_at = Utc::now();
        let metadata =
            fs::metadata(source_path)
                .await
                .map_err(|source| TranscodeError::SourceUnreadable {
                    source,
                    path: source_path.to_path_buf(),
                })?;
        if !metadata.is_file() {
            return Err(TranscodeError::SourceUnreadable {
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                path: source_path.to_path_buf(),
            });
        }

        let job_dir = self.layout.job_dir(job_id);
        fs::create_dir_all(&job_dir)
            .await
            .map_err(|source| TranscodeError::Io {
                source,
                path: job_dir.clone(),
            })?;

        info!(job_id, source = %source_path.display(), rungs = self.ladder.len(), "transcode job started");

        let chains = self
            .ladder
            .iter()
            .map(|rung| self.run_rung(source_path, job_id, rung));
        let rungs = join_all(chains).await;

        let master_playlist = self.write_master_playlist(job_id, &rungs).await?;

        let job = TranscodeJob {
            job_id: job_id.to_string(),
            source_path: source_path.to_path_buf(),
            rungs,
            master_playlist,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            job_id,
            status = ?job.overall_status(),
            done = job.surviving_rungs().count(),
            "transcode job finished"
        );
        Ok(job)
    }

    /// One rung's chain: encode to the target dimensions, then package
    /// the encoded file into a segmented stream. Strictly sequential;
    /// segmentation never starts unless the encode succeeded.
    async fn run_rung(&self, source_path: &Path, job_id: &str, rung: &Rung) -> RungResult {
        let mut result = RungResult::pending(rung.name, rung.width, rung.height);

        result.state = RungState::Encoding;
        let encoded = self.layout.encoded_path(job_id, rung.name);
        match self.encode(source_path, rung, &encoded).await {
            Ok(()) => {
                debug!(job_id, rung = rung.name, path = %encoded.display(), "encode complete");
                result.encoded_path = Some(encoded.clone());
            }
            Err(cause) => {
                warn!(job_id, rung = rung.name, %cause, "encode failed");
                result.state = RungState::Failed {
                    stage: RungStage::Encode,
                    cause,
                };
                return result;
            }
        }

        result.state = RungState::Segmenting;
        match self.segment(&encoded, job_id, rung.name).await {
            Ok((manifest_path, segment_paths)) => {
                debug!(
                    job_id,
                    rung = rung.name,
                    segments = segment_paths.len(),
                    "segmentation complete"
                );
                result.manifest_path = Some(manifest_path);
                result.segment_paths = segment_paths;
                result.state = RungState::Done;
            }
            Err(cause) => {
                warn!(job_id, rung = rung.name, %cause, "segmentation failed");
                result.state = RungState::Failed {
                    stage: RungStage::Segment,
                    cause,
                };
            }
        }
        result
    }

    /// Rescale the source to the rung's dimensions, writing one
    /// intermediate file. A stale partial file left behind by a failed
    /// run is overwritten (`-y`), never reused.
    async fn encode(&self, source_path: &Path, rung: &Rung, dest: &Path) -> Result<(), String> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| format!("cannot create {}: {err}", parent.display()))?;
        }
        let mut command = Command::new(&self.config.ffmpeg);
        command
            .kill_on_drop(true)
            .arg("-y")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(source_path)
            .arg("-vf")
            .arg(rung.scale_filter())
            .arg(dest);
        self.run_engine(command, dest).await
    }

    /// Repackage an encoded file into a variant manifest plus
    /// fixed-duration chunks named by index.
    async fn segment(
        &self,
        encoded: &Path,
        job_id: &str,
        rung: &str,
    ) -> Result<(PathBuf, Vec<PathBuf>), String> {
        let segment_dir = self.layout.segment_dir(job_id, rung);
        fs::create_dir_all(&segment_dir)
            .await
            .map_err(|err| format!("cannot create {}: {err}", segment_dir.display()))?;
        let manifest_path = self.layout.manifest_path(job_id, rung);
        let segment_template = segment_dir.join(format!("%d.{SEGMENT_EXTENSION}"));

        let mut command = Command::new(&self.config.ffmpeg);
        command
            .kill_on_drop(true)
            .arg("-y")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(encoded)
            .arg("-profile:v")
            .arg("baseline")
            .arg("-level")
            .arg("3.0")
            .arg("-start_number")
            .arg("0")
            .arg("-hls_time")
            .arg(self.config.segment_seconds.to_string())
            .arg("-hls_list_size")
            .arg("0")
            .arg("-hls_segment_filename")
            .arg(&segment_template)
            .arg("-f")
            .arg("hls")
            .arg(&manifest_path);
        self.run_engine(command, &manifest_path).await?;

        let contents = fs::read_to_string(&manifest_path)
            .await
            .map_err(|err| format!("cannot read {}: {err}", manifest_path.display()))?;
        let uris = parse_variant_manifest(&contents)?;
        let mut segment_paths = Vec::with_capacity(uris.len());
        for uri in uris {
            let path = segment_dir.join(&uri);
            if !fs::try_exists(&path).await.unwrap_or(false) {
                return Err(format!("manifest references missing chunk {uri}"));
            }
            segment_paths.push(path);
        }
        Ok((manifest_path, segment_paths))
    }

    async fn run_engine(&self, mut command: Command, expected: &Path) -> Result<(), String> {
        let execution = timeout(self.config.timeout(), self.executor.run(&mut command));
        match execution.await {
            Ok(Ok(output)) if output.status.success() => {
                if fs::try_exists(expected).await.unwrap_or(false) {
                    Ok(())
                } else {
                    Err(format!(
                        "engine exited cleanly but {} was not written",
                        expected.display()
                    ))
                }
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    Err(format!("engine exited with status {}", output.status))
                } else {
                    Err(stderr.to_string())
                }
            }
            Ok(Err(err)) => Err(format!("failed to launch {}: {err}", self.config.ffmpeg)),
            Err(_) => Err(format!(
                "engine timed out after {:?}",
                self.config.timeout()
            )),
        }
    }

    /// Write the master playlist referencing every surviving rung. No
    /// playlist is written when every rung failed.
    async fn write_master_playlist(
        &self,
        job_id: &str,
        rungs: &[RungResult],
    ) -> TranscodeResult<Option<PathBuf>> {
        let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        let mut survivors = 0usize;
        for result in rungs.iter().filter(|result| result.is_done()) {
            let Some(rung) = self.ladder.get(&result.name) else {
                continue;
            };
            playlist.push_str(&format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n",
                rung.bandwidth,
                rung.resolution()
            ));
            playlist.push_str(&format!("{}_hls/{VARIANT_MANIFEST_NAME}\n", result.name));
            survivors += 1;
        }
        if survivors == 0 {
            return Ok(None);
        }
        let path = self.layout.master_playlist_path(job_id);
        fs::write(&path, playlist)
            .await
            .map_err(|source| TranscodeError::Io {
                source,
                path: path.clone(),
            })?;
        Ok(Some(path))
    }
}

/// Minimal variant-manifest reader: returns chunk URIs in listed order.
fn parse_variant_manifest(contents: &str) -> Result<Vec<String>, String> {
    if !contents.trim_start().starts_with("#EXTM3U") {
        return Err("manifest missing #EXTM3U header".into());
    }
    let uris: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if uris.is_empty() {
        return Err("manifest lists no chunks".into());
    }
    Ok(uris)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parser_keeps_listed_order() {
        let contents = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n\
                        #EXTINF:10.000000,\n0.ts\n#EXTINF:10.000000,\n1.ts\n\
                        #EXTINF:4.200000,\n2.ts\n#EXT-X-ENDLIST\n";
        let uris = parse_variant_manifest(contents).unwrap();
        assert_eq!(uris, ["0.ts", "1.ts", "2.ts"]);
    }

    #[test]
    fn manifest_parser_rejects_garbage() {
        assert!(parse_variant_manifest("not a playlist").is_err());
        assert!(parse_variant_manifest("#EXTM3U\n#EXT-X-ENDLIST\n").is_err());
    }
}
