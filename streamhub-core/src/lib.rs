pub mod catalog;
pub mod config;
pub mod delivery;
pub mod error;
pub mod ladder;
pub mod layout;
pub mod transcode;

pub use catalog::{
    CatalogError, CatalogResult, SqliteVideoCatalog, SqliteVideoCatalogBuilder, VideoCatalog,
    VideoRecord,
};
pub use config::{
    load_streamhub_config, DeliverySection, PathsSection, StreamhubConfig, TranscoderSection,
};
pub use delivery::{Artifact, DeliveryError, DeliveryResult, DeliveryService};
pub use error::{ConfigError, Result};
pub use ladder::{Ladder, Rung};
pub use layout::{StorageLayout, MASTER_PLAYLIST_NAME, VARIANT_MANIFEST_NAME};
pub use transcode::{
    CommandExecutor, JobStatus, RungResult, RungStage, RungState, SystemCommandExecutor,
    TranscodeError, TranscodeJob, TranscodeResult, Transcoder,
};
