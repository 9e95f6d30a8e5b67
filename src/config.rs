//! Run configuration.
//!
//! The two query-result URLs come from the caller (flags or the
//! `ROAD_SEGMENTS_URL` / `INFOGRAPHICS_URL` environment variables). Both are
//! checked before anything touches the network.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone)]
pub struct Config {
    pub road_segments_url: String,
    pub infographics_url: String,
    pub data_dir: PathBuf,
    pub timeout: Duration,
}

impl Config {
    /// Validates the source URLs. Missing and empty values are both
    /// rejected, naming every variable that needs to be set.
    pub fn new(
        road_segments_url: Option<String>,
        infographics_url: Option<String>,
        data_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let road_segments_url = road_segments_url.filter(|u| !u.trim().is_empty());
        let infographics_url = infographics_url.filter(|u| !u.trim().is_empty());

        match (road_segments_url, infographics_url) {
            (Some(road_segments_url), Some(infographics_url)) => Ok(Config {
                road_segments_url,
                infographics_url,
                data_dir: data_dir.into(),
                timeout,
            }),
            (segments, infographics) => {
                let missing: Vec<&str> = [
                    segments.is_none().then_some("ROAD_SEGMENTS_URL"),
                    infographics.is_none().then_some("INFOGRAPHICS_URL"),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(PipelineError::Config(format!(
                    "missing source URL: {}",
                    missing.join(", ")
                )))
            }
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        source_dir(&self.data_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        output_dir(&self.data_dir)
    }
}

/// Where raw source rows are persisted.
pub fn source_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("source_data")
}

/// Where the four reports are written.
pub fn output_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("output_data")
}
