use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use streamhub_core::{
    load_streamhub_config, DeliveryService, JobStatus, Ladder, RungStage, RungState,
    SqliteVideoCatalog, StorageLayout, StreamhubConfig, TranscodeJob, Transcoder, VideoCatalog,
    VideoRecord,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] streamhub_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog error: {0}")]
    Catalog(#[from] streamhub_core::CatalogError),
    #[error("transcode error: {0}")]
    Transcode(#[from] streamhub_core::TranscodeError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
    #[error("no rung produced playable output for job {0}")]
    NoPlayableRung(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "StreamHub command-line control interface", long_about = None)]
pub struct Cli {
    /// Path to the main streamhub.toml
    #[arg(long, default_value = "configs/streamhub.toml")]
    pub config: PathBuf,
    /// Override for the converted artifacts directory
    #[arg(long)]
    pub converted_dir: Option<PathBuf>,
    /// Override for the catalog database
    #[arg(long)]
    pub catalog_db: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcode an uploaded source across the resolution ladder
    Transcode(TranscodeArgs),
    /// Serve HLS artifacts over HTTP
    Serve(ServeArgs),
    /// Show the resolution ladder
    Ladder,
    /// Manage catalog records
    #[command(subcommand)]
    Catalog(CatalogCommands),
}

#[derive(Args, Debug)]
pub struct TranscodeArgs {
    /// Stored upload to transcode
    pub source: PathBuf,
    /// Job id; defaults to the source filename without its extension
    #[arg(long)]
    pub job_id: Option<String>,
    /// Register the result in the catalog under this video id
    #[arg(long)]
    pub video_id: Option<String>,
    /// Title for the catalog record
    #[arg(long)]
    pub title: Option<String>,
    /// Mark the catalog record private
    #[arg(long, default_value_t = false)]
    pub private: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address; defaults to delivery.bind from the config
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommands {
    /// Insert or update a video record
    Add(CatalogAddArgs),
    /// Hide a video from delivery
    Hide(CatalogIdArgs),
    /// Make a hidden video deliverable again
    Show(CatalogIdArgs),
}

#[derive(Args, Debug)]
pub struct CatalogAddArgs {
    /// Video id
    pub video_id: String,
    /// Stored filename of the uploaded source
    #[arg(long)]
    pub source_filename: String,
    /// Display title; defaults to the job id
    #[arg(long)]
    pub title: Option<String>,
    /// Create the record hidden from delivery
    #[arg(long, default_value_t = false)]
    pub private: bool,
}

#[derive(Args, Debug)]
pub struct CatalogIdArgs {
    /// Video id
    pub video_id: String,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Transcode(args) => {
            let report = context.transcode(args)?;
            render(&report, cli.format)?;
            if report.status == JobStatus::Failed {
                return Err(AppError::NoPlayableRung(report.job_id.clone()));
            }
        }
        Commands::Serve(args) => {
            context.serve(args)?;
        }
        Commands::Ladder => {
            let report = context.ladder_report();
            render(&report, cli.format)?;
        }
        Commands::Catalog(CatalogCommands::Add(args)) => {
            let change = context.catalog_add(args)?;
            render(&change, cli.format)?;
        }
        Commands::Catalog(CatalogCommands::Hide(args)) => {
            let change = context.catalog_set_private(&args.video_id, true)?;
            render(&change, cli.format)?;
        }
        Commands::Catalog(CatalogCommands::Show(args)) => {
            let change = context.catalog_set_private(&args.video_id, false)?;
            render(&change, cli.format)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: StreamhubConfig,
    converted_dir: PathBuf,
    catalog_db: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_streamhub_config(&cli.config)?;
        let converted_dir = cli
            .converted_dir
            .clone()
            .unwrap_or_else(|| config.converted_dir());
        let catalog_db = cli.catalog_db.clone().unwrap_or_else(|| config.catalog_db());
        Ok(Self {
            config,
            converted_dir,
            catalog_db,
        })
    }

    fn layout(&self) -> StorageLayout {
        StorageLayout::new(&self.converted_dir)
    }

    fn open_catalog(&self) -> Result<SqliteVideoCatalog> {
        let catalog = SqliteVideoCatalog::new(&self.catalog_db)?;
        catalog.initialize()?;
        Ok(catalog)
    }

    fn transcode(&self, args: &TranscodeArgs) -> Result<JobReport> {
        let filename = args
            .source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AppError::MissingResource(format!(
                    "source has no usable filename: {}",
                    args.source.display()
                ))
            })?
            .to_string();
        let job_id = args
            .job_id
            .clone()
            .unwrap_or_else(|| StorageLayout::job_id_for(&filename));

        let transcoder = Transcoder::new(
            Ladder::default(),
            self.layout(),
            self.config.transcoder.clone(),
        );
        let runtime = tokio::runtime::Runtime::new()?;
        let job = runtime.block_on(transcoder.run_job(&args.source, &job_id))?;

        // A video becomes visible to delivery only once at least one
        // rung produced playable output.
        let mut registered_video = None;
        if let Some(video_id) = &args.video_id {
            if job.surviving_rungs().next().is_some() {
                let catalog = self.open_catalog()?;
                catalog.upsert(&VideoRecord {
                    id: video_id.clone(),
                    title: args.title.clone().unwrap_or_else(|| job_id.clone()),
                    source_filename: filename,
                    is_private: args.private,
                    created_at: chrono::Utc::now(),
                })?;
                registered_video = Some(video_id.clone());
            }
        }

        Ok(JobReport::from_job(&job, registered_video))
    }

    fn serve(&self, args: &ServeArgs) -> Result<()> {
        let catalog = self.open_catalog()?;
        let service = DeliveryService::new(Ladder::default(), self.layout(), Arc::new(catalog));
        let bind = args
            .bind
            .clone()
            .unwrap_or_else(|| self.config.delivery.bind.clone());
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(streamhub_core::delivery::http::serve(
            &bind,
            Arc::new(service),
        ))?;
        Ok(())
    }

    fn ladder_report(&self) -> LadderReport {
        LadderReport {
            rungs: Ladder::default()
                .iter()
                .map(|rung| RungInfo {
                    name: rung.name.to_string(),
                    resolution: rung.resolution(),
                    bandwidth: rung.bandwidth,
                })
                .collect(),
        }
    }

    fn catalog_add(&self, args: &CatalogAddArgs) -> Result<CatalogChange> {
        let catalog = self.open_catalog()?;
        catalog.upsert(&VideoRecord {
            id: args.video_id.clone(),
            title: args
                .title
                .clone()
                .unwrap_or_else(|| StorageLayout::job_id_for(&args.source_filename)),
            source_filename: args.source_filename.clone(),
            is_private: args.private,
            created_at: chrono::Utc::now(),
        })?;
        Ok(CatalogChange {
            video_id: args.video_id.clone(),
            action: "added".to_string(),
        })
    }

    fn catalog_set_private(&self, video_id: &str, is_private: bool) -> Result<CatalogChange> {
        let catalog = self.open_catalog()?;
        if !catalog.set_private(video_id, is_private)? {
            return Err(AppError::MissingResource(format!(
                "no catalog record for video {video_id}"
            )));
        }
        Ok(CatalogChange {
            video_id: video_id.to_string(),
            action: if is_private { "hidden" } else { "visible" }.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub status: JobStatus,
    pub rungs: Vec<RungReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_playlist: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_video: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RungReport {
    pub name: String,
    pub resolution: String,
    pub outcome: String,
}

impl JobReport {
    fn from_job(job: &TranscodeJob, registered_video: Option<String>) -> Self {
        let rungs = job
            .rungs
            .iter()
            .map(|rung| {
                let outcome = match &rung.state {
                    RungState::Done => format!("done ({} chunks)", rung.segment_paths.len()),
                    RungState::Failed { stage, cause } => {
                        let stage = match stage {
                            RungStage::Encode => "encode",
                            RungStage::Segment => "segment",
                        };
                        format!("failed ({stage}): {cause}")
                    }
                    other => format!("{other:?}"),
                };
                RungReport {
                    name: rung.name.clone(),
                    resolution: format!("{}x{}", rung.width, rung.height),
                    outcome,
                }
            })
            .collect();

        Self {
            job_id: job.job_id.clone(),
            status: job.overall_status(),
            rungs,
            master_playlist: job.master_playlist.clone(),
            registered_video,
        }
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Running => "running",
        JobStatus::Succeeded => "succeeded",
        JobStatus::PartiallyFailed => "partially-failed",
        JobStatus::Failed => "failed",
    }
}

impl DisplayFallback for JobReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("job {}: {}", self.job_id, status_label(self.status))];
        for rung in &self.rungs {
            lines.push(format!(
                "  {name:<6} {resolution:<10} {outcome}",
                name = rung.name,
                resolution = rung.resolution,
                outcome = rung.outcome
            ));
        }
        if let Some(master) = &self.master_playlist {
            lines.push(format!("master playlist: {}", master.display()));
        }
        if let Some(video_id) = &self.registered_video {
            lines.push(format!("registered as video {video_id}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct LadderReport {
    pub rungs: Vec<RungInfo>,
}

#[derive(Debug, Serialize)]
pub struct RungInfo {
    pub name: String,
    pub resolution: String,
    pub bandwidth: u32,
}

impl DisplayFallback for LadderReport {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for rung in &self.rungs {
            lines.push(format!(
                "{name:<6} {resolution:<10} {bandwidth} bps",
                name = rung.name,
                resolution = rung.resolution,
                bandwidth = rung.bandwidth
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogChange {
    pub video_id: String,
    pub action: String,
}

impl DisplayFallback for CatalogChange {
    fn display(&self) -> String {
        format!("video {}: {}", self.video_id, self.action)
    }
}
