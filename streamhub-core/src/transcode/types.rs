use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Pipeline stage a rung failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RungStage {
    Encode,
    Segment,
}

/// Lifecycle of one rung. `Pending -> Encoding -> Segmenting -> Done`
/// on the success path; `Failed` is reachable from `Encoding` and
/// `Segmenting`. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RungState {
    Pending,
    Encoding,
    Segmenting,
    Done,
    Failed { stage: RungStage, cause: String },
}

impl RungState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RungState::Done | RungState::Failed { .. })
    }
}

/// Outcome of one ladder rung within a job. Owned and mutated only by
/// the orchestrator driving that job.
#[derive(Debug, Clone, Serialize)]
pub struct RungResult {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Set only when the encode step succeeded.
    pub encoded_path: Option<PathBuf>,
    /// Set only when the segment step succeeded.
    pub manifest_path: Option<PathBuf>,
    /// Chunk files in manifest order; empty unless segmentation succeeded.
    pub segment_paths: Vec<PathBuf>,
    pub state: RungState,
}

impl RungResult {
    pub(super) fn pending(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            encoded_path: None,
            manifest_path: None,
            segment_paths: Vec::new(),
            state: RungState::Pending,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == RungState::Done
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, RungState::Failed { .. })
    }
}

/// Aggregate job status, derived from rung states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
}

/// One full transcoding run for one uploaded source. Rung order equals
/// ladder order regardless of completion order.
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeJob {
    pub job_id: String,
    pub source_path: PathBuf,
    pub rungs: Vec<RungResult>,
    /// Master playlist listing surviving rungs; absent when every rung
    /// failed.
    pub master_playlist: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TranscodeJob {
    pub fn overall_status(&self) -> JobStatus {
        if self.rungs.iter().any(|rung| !rung.state.is_terminal()) {
            return JobStatus::Running;
        }
        let done = self.rungs.iter().filter(|rung| rung.is_done()).count();
        if done == self.rungs.len() {
            JobStatus::Succeeded
        } else if done == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartiallyFailed
        }
    }

    pub fn rung(&self, name: &str) -> Option<&RungResult> {
        self.rungs.iter().find(|rung| rung.name == name)
    }

    /// Rungs with playable artifacts, in ladder order.
    pub fn surviving_rungs(&self) -> impl Iterator<Item = &RungResult> {
        self.rungs.iter().filter(|rung| rung.is_done())
    }
}
