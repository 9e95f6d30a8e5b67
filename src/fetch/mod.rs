mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::path::Path;

use anyhow::{Context, bail};
use serde_json::Value;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::output::{raw_columns, write_raw_rows};
use crate::parser::{Metadata, parse_metadata, parse_rows};

/// The two remote datasets a run consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Road segment reference table.
    RoadSegments,
    /// Per-segment accident and injury statistics.
    Infographics,
}

impl Source {
    pub fn name(self) -> &'static str {
        match self {
            Source::RoadSegments => "road_segments",
            Source::Infographics => "infographics_data_cache_5_years",
        }
    }

    /// File the raw rows are persisted to, inside the source directory.
    pub fn file_name(self) -> String {
        format!("{}.csv", self.name())
    }

    /// Only the statistics source embeds run metadata.
    pub fn carries_metadata(self) -> bool {
        matches!(self, Source::Infographics)
    }
}

/// Rows of one source, plus metadata for the statistics source.
#[derive(Debug)]
pub struct Fetched {
    pub rows: Vec<Value>,
    pub metadata: Option<Metadata>,
}

/// Issues a single GET and returns the body of a successful response.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> anyhow::Result<Vec<u8>> {
    let req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse::<reqwest::Url>().context("invalid source URL")?,
    );

    let resp = client.execute(req).await.context("network error")?;
    let status = resp.status();
    if !status.is_success() {
        bail!("unexpected HTTP status {status}");
    }

    Ok(resp.bytes().await.context("failed to read response body")?.to_vec())
}

/// Downloads one source, persists its raw rows under `source_dir` and
/// returns them.
///
/// The URL is kept out of logs and errors since query-result URLs usually
/// carry an API key.
#[tracing::instrument(skip_all, fields(source = source.name()))]
pub async fn fetch_source<C: HttpClient>(
    client: &C,
    source: Source,
    url: &str,
    source_dir: &Path,
) -> Result<Fetched> {
    let bytes = fetch_bytes(client, url)
        .await
        .map_err(|e| PipelineError::fetch(source.name(), format!("{e:#}")))?;

    let rows = parse_rows(&bytes).map_err(|reason| PipelineError::fetch(source.name(), reason))?;

    let metadata = if source.carries_metadata() {
        Some(parse_metadata(&rows).map_err(|reason| PipelineError::fetch(source.name(), reason))?)
    } else {
        None
    };

    write_raw_rows(&source_dir.join(source.file_name()), &rows)?;

    info!(
        rows = rows.len(),
        columns = raw_columns(&rows).len(),
        "Source downloaded"
    );

    Ok(Fetched { rows, metadata })
}
