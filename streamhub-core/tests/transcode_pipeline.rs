use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use streamhub_core::catalog::{SqliteVideoCatalog, VideoCatalog, VideoRecord};
use streamhub_core::config::TranscoderSection;
use streamhub_core::delivery::DeliveryService;
use streamhub_core::ladder::{Ladder, Rung};
use streamhub_core::layout::StorageLayout;
use streamhub_core::transcode::{
    CommandExecutor, JobStatus, RungStage, RungState, TranscodeError, Transcoder,
};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
#[cfg(windows)]
use std::os::windows::process::ExitStatusExt;

const FAKE_SEGMENT_COUNT: usize = 3;

fn success_status() -> std::process::ExitStatus {
    std::process::ExitStatus::from_raw(0)
}

fn failure_status() -> std::process::ExitStatus {
    #[cfg(unix)]
    {
        std::process::ExitStatus::from_raw(256)
    }
    #[cfg(windows)]
    {
        std::process::ExitStatus::from_raw(1)
    }
}

/// Stands in for ffmpeg: synthesizes the files the real engine would
/// write, or fails for a chosen rung and stage.
struct FakeEngine {
    fail_rung: Option<(String, RungStage)>,
    fail_all: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            fail_rung: None,
            fail_all: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_for(rung: &str, stage: RungStage) -> Self {
        Self {
            fail_rung: Some((rung.to_string(), stage)),
            ..Self::new()
        }
    }

    fn failing_always() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    fn should_fail(&self, rung: &str, stage: RungStage) -> bool {
        self.fail_all
            || self
                .fail_rung
                .as_ref()
                .is_some_and(|(name, at)| name == rung && *at == stage)
    }
}

fn arg_after(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn failure(stderr: &str) -> Output {
    Output {
        status: failure_status(),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

fn success() -> Output {
    Output {
        status: success_status(),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

#[async_trait]
impl CommandExecutor for FakeEngine {
    async fn run(&self, command: &mut Command) -> io::Result<Output> {
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        self.calls.lock().unwrap().push(args.clone());

        if let Some(template) = arg_after(&args, "-hls_segment_filename") {
            // Segment invocation: last arg is the manifest path.
            let manifest = PathBuf::from(args.last().unwrap());
            let rung = manifest
                .parent()
                .and_then(|dir| dir.file_name())
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix("_hls"))
                .unwrap()
                .to_string();
            if self.should_fail(&rung, RungStage::Segment) {
                return Ok(failure("segmenter exploded"));
            }
            let mut playlist = String::from(
                "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:0\n",
            );
            for index in 0..FAKE_SEGMENT_COUNT {
                let chunk = template.replace("%d", &index.to_string());
                std::fs::write(&chunk, format!("CHUNK {rung} {index}\n"))?;
                let name = Path::new(&chunk).file_name().unwrap().to_string_lossy();
                playlist.push_str(&format!("#EXTINF:10.000000,\n{name}\n"));
            }
            playlist.push_str("#EXT-X-ENDLIST\n");
            std::fs::write(&manifest, playlist)?;
            return Ok(success());
        }

        // Encode invocation: last arg is the destination file.
        let dest = PathBuf::from(args.last().unwrap());
        let rung = dest.file_stem().unwrap().to_string_lossy().to_string();
        if self.should_fail(&rung, RungStage::Encode) {
            return Ok(failure("encoder exploded"));
        }
        let filter = arg_after(&args, "-vf").unwrap_or_default();
        std::fs::write(&dest, format!("ENCODED {rung} {filter}\n"))?;
        Ok(success())
    }
}

fn test_ladder() -> Ladder {
    Ladder::new(vec![
        Rung {
            name: "low",
            width: 640,
            height: 360,
            bandwidth: 800_000,
        },
        Rung {
            name: "mid",
            width: 1280,
            height: 720,
            bandwidth: 2_800_000,
        },
        Rung {
            name: "high",
            width: 1920,
            height: 1080,
            bandwidth: 5_000_000,
        },
    ])
}

fn transcoder_config() -> TranscoderSection {
    TranscoderSection {
        ffmpeg: "ffmpeg".to_string(),
        segment_seconds: 10,
        timeout_seconds: 60,
    }
}

struct Fixture {
    _base: TempDir,
    source: PathBuf,
    layout: StorageLayout,
}

fn fixture() -> Fixture {
    let base = TempDir::new().unwrap();
    let source = base.path().join("uploads/video-1700000000-42.mp4");
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(&source, "SOURCE BYTES\n").unwrap();
    let layout = StorageLayout::new(base.path().join("uploads/converted"));
    Fixture {
        _base: base,
        source,
        layout,
    }
}

fn transcoder(fixture: &Fixture, engine: FakeEngine) -> Transcoder {
    Transcoder::new(test_ladder(), fixture.layout.clone(), transcoder_config())
        .with_executor(Arc::new(engine))
}

#[tokio::test]
async fn successful_job_covers_every_rung() {
    let fx = fixture();
    let transcoder = transcoder(&fx, FakeEngine::new());

    let job = transcoder.run_job(&fx.source, "video-1700000000-42").await.unwrap();

    assert_eq!(job.overall_status(), JobStatus::Succeeded);
    let names: Vec<_> = job.rungs.iter().map(|rung| rung.name.as_str()).collect();
    assert_eq!(names, ["low", "mid", "high"]);

    for rung in &job.rungs {
        assert_eq!(rung.state, RungState::Done);
        let manifest = rung.manifest_path.as_ref().unwrap();
        assert!(manifest.exists(), "manifest missing for {}", rung.name);
        assert_eq!(rung.segment_paths.len(), FAKE_SEGMENT_COUNT);
        for segment in &rung.segment_paths {
            assert!(segment.exists(), "chunk missing for {}", rung.name);
        }
        assert!(rung.encoded_path.as_ref().unwrap().exists());
    }

    let master = job.master_playlist.as_ref().unwrap();
    let contents = std::fs::read_to_string(master).unwrap();
    for name in ["low", "mid", "high"] {
        assert!(contents.contains(&format!("{name}_hls/index.m3u8")));
    }
    assert!(contents.contains("RESOLUTION=1280x720"));
}

#[tokio::test]
async fn encode_failure_is_scoped_to_one_rung() {
    let fx = fixture();
    let transcoder = transcoder(&fx, FakeEngine::failing_for("mid", RungStage::Encode));

    let job = transcoder.run_job(&fx.source, "job-a").await.unwrap();

    assert_eq!(job.overall_status(), JobStatus::PartiallyFailed);
    let mid = job.rung("mid").unwrap();
    match &mid.state {
        RungState::Failed { stage, cause } => {
            assert_eq!(*stage, RungStage::Encode);
            assert!(!cause.is_empty());
        }
        other => panic!("expected mid to fail, got {other:?}"),
    }
    assert!(mid.encoded_path.is_none());
    assert!(mid.manifest_path.is_none());
    assert!(mid.segment_paths.is_empty());

    for name in ["low", "high"] {
        let rung = job.rung(name).unwrap();
        assert_eq!(rung.state, RungState::Done, "{name} should be unaffected");
        assert!(rung.manifest_path.as_ref().unwrap().exists());
    }

    // Surviving rungs are playable: the master playlist skips only `mid`.
    let master = std::fs::read_to_string(job.master_playlist.as_ref().unwrap()).unwrap();
    assert!(master.contains("low_hls/index.m3u8"));
    assert!(master.contains("high_hls/index.m3u8"));
    assert!(!master.contains("mid_hls/index.m3u8"));
}

#[tokio::test]
async fn segment_failure_keeps_encoded_intermediate() {
    let fx = fixture();
    let transcoder = transcoder(&fx, FakeEngine::failing_for("mid", RungStage::Segment));

    let job = transcoder.run_job(&fx.source, "job-b").await.unwrap();

    assert_eq!(job.overall_status(), JobStatus::PartiallyFailed);
    let mid = job.rung("mid").unwrap();
    assert!(matches!(
        mid.state,
        RungState::Failed {
            stage: RungStage::Segment,
            ..
        }
    ));
    assert!(mid.encoded_path.as_ref().unwrap().exists());
    assert!(mid.manifest_path.is_none());
}

#[tokio::test]
async fn all_rungs_failing_fails_the_job() {
    let fx = fixture();
    let transcoder = transcoder(&fx, FakeEngine::failing_always());

    let job = transcoder.run_job(&fx.source, "job-c").await.unwrap();

    assert_eq!(job.overall_status(), JobStatus::Failed);
    assert!(job.rungs.iter().all(|rung| rung.is_failed()));
    assert!(job.master_playlist.is_none());
    assert!(!fx.layout.master_playlist_path("job-c").exists());
}

#[tokio::test]
async fn missing_source_fails_before_any_output() {
    let fx = fixture();
    let transcoder = transcoder(&fx, FakeEngine::new());
    let missing = fx.source.with_file_name("nope.mp4");

    let err = transcoder.run_job(&missing, "job-d").await.unwrap_err();

    assert!(matches!(err, TranscodeError::SourceUnreadable { .. }));
    assert!(!fx.layout.job_dir("job-d").exists());
}

#[tokio::test]
async fn delivery_serves_what_the_job_wrote() {
    let fx = fixture();
    let transcoder = transcoder(&fx, FakeEngine::new());
    let job = transcoder.run_job(&fx.source, "video-1700000000-42").await.unwrap();
    assert_eq!(job.overall_status(), JobStatus::Succeeded);

    let catalog = SqliteVideoCatalog::new(fx.layout.root().join("catalog.sqlite")).unwrap();
    catalog.initialize().unwrap();
    catalog
        .upsert(&VideoRecord {
            id: "vid-1".to_string(),
            title: "demo".to_string(),
            source_filename: "video-1700000000-42.mp4".to_string(),
            is_private: false,
            created_at: chrono::Utc::now(),
        })
        .unwrap();

    let service = DeliveryService::new(
        test_ladder(),
        fx.layout.clone(),
        Arc::new(catalog),
    );

    let artifact = service.manifest("vid-1", "mid").await.unwrap();
    let mut served = Vec::new();
    let mut file = artifact.file;
    file.read_to_end(&mut served).await.unwrap();
    let on_disk = std::fs::read(job.rung("mid").unwrap().manifest_path.as_ref().unwrap()).unwrap();
    assert_eq!(served, on_disk);
}
