use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamhubConfig {
    pub paths: PathsSection,
    pub transcoder: TranscoderSection,
    pub delivery: DeliverySection,
}

impl StreamhubConfig {
    /// Resolve a possibly relative path against `paths.base_dir`.
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    /// Root directory for transcoded artifacts (`.../converted`).
    pub fn converted_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.converted_dir)
    }

    pub fn catalog_db(&self) -> PathBuf {
        self.resolve_path(&self.paths.catalog_db)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub uploads_dir: String,
    pub converted_dir: String,
    pub catalog_db: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscoderSection {
    pub ffmpeg: String,
    pub segment_seconds: u32,
    pub timeout_seconds: u64,
}

impl TranscoderSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySection {
    pub bind: String,
}

pub fn load_streamhub_config<P: AsRef<Path>>(path: P) -> Result<StreamhubConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_example_config() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("configs/streamhub.toml");
        let config = load_streamhub_config(path).unwrap();
        assert_eq!(config.transcoder.segment_seconds, 10);
        assert!(config.converted_dir().ends_with("uploads/converted"));
    }

    #[test]
    fn resolve_path_keeps_absolute() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("configs/streamhub.toml");
        let config = load_streamhub_config(path).unwrap();
        assert_eq!(
            config.resolve_path("/tmp/x"),
            PathBuf::from("/tmp/x")
        );
    }
}
