//! End-to-end report generation.
//!
//! Stages run strictly in sequence: both sources are fetched and persisted,
//! statistics rows are extracted, then segment and road reports are built.
//! Output files are only replaced once every report has been built and
//! written to a temporary file. The first failure aborts the run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::analyzers::roads::build_road_report;
use crate::analyzers::segments::build_segment_report;
use crate::analyzers::types::ReferenceSegment;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::fetch::{HttpClient, Source, fetch_source};
use crate::output::{commit_all, load_raw_rows, stage_bytes, stage_table};
use crate::parser::{Metadata, parse_metadata};
use crate::stats::extract_records;

pub const ALL_SEGMENTS_FILE: &str = "all_segments.csv";
pub const SEGMENTS_1_KM_FILE: &str = "all_segments_1_km_and_above.csv";
pub const ALL_ROADS_FILE: &str = "all_roads.csv";
pub const ROADS_1_KM_FILE: &str = "all_roads_1_km_and_above.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub segments: usize,
    pub segments_1_km_and_above: usize,
    pub roads: usize,
    pub roads_1_km_and_above: usize,
    pub metadata: Metadata,
    pub output_dir: PathBuf,
}

/// Fetches both sources and writes the four reports.
#[tracing::instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
pub async fn run<C: HttpClient>(client: &C, config: &Config) -> Result<RunSummary> {
    let source_dir = config.source_dir();
    let output_dir = config.output_dir();
    create_dir(&source_dir)?;
    create_dir(&output_dir)?;

    info!("Downloading road segments");
    let segments = fetch_source(client, Source::RoadSegments, &config.road_segments_url, &source_dir).await?;

    info!("Downloading infographics data");
    let statistics = fetch_source(client, Source::Infographics, &config.infographics_url, &source_dir).await?;

    process(
        &segments.rows,
        &statistics.rows,
        statistics.metadata.unwrap_or_default(),
        &output_dir,
    )
}

/// Re-runs the reports from raw source files persisted by an earlier run.
#[tracing::instrument]
pub fn process_saved(source_dir: &Path, output_dir: &Path) -> Result<RunSummary> {
    create_dir(output_dir)?;

    let statistics = load_raw_rows(&source_dir.join(Source::Infographics.file_name()))?;
    let segments = load_raw_rows(&source_dir.join(Source::RoadSegments.file_name()))?;
    let metadata = parse_metadata(&statistics)
        .map_err(|reason| PipelineError::fetch(Source::Infographics.name(), reason))?;

    process(&segments, &statistics, metadata, output_dir)
}

/// Builds and writes all reports from already-fetched rows.
pub fn process(
    reference_rows: &[Value],
    statistics_rows: &[Value],
    metadata: Metadata,
    output_dir: &Path,
) -> Result<RunSummary> {
    info!(
        date_range = ?metadata.date_range.as_ref().map(|r| format!("{}-{}", r.start, r.end)),
        last_update = ?metadata.last_update_display(),
        "Meta info"
    );

    let reference = parse_reference(reference_rows)?;

    info!(rows = statistics_rows.len(), "Extracting segment data");
    let records = extract_records(statistics_rows)?;

    let segments = build_segment_report(&records, &reference)?;
    let roads = build_road_report(&segments.all)?;

    let summary = RunSummary {
        generated_at: Utc::now(),
        segments: segments.all.len(),
        segments_1_km_and_above: segments.one_km_and_above.len(),
        roads: roads.all.len(),
        roads_1_km_and_above: roads.one_km_and_above.len(),
        metadata,
        output_dir: output_dir.to_path_buf(),
    };

    let summary_path = output_dir.join(SUMMARY_FILE);
    let json = serde_json::to_vec_pretty(&summary).map_err(|e| PipelineError::io(&summary_path, e))?;

    commit_all(vec![
        stage_table(&output_dir.join(ALL_SEGMENTS_FILE), &segments.all)?,
        stage_table(&output_dir.join(SEGMENTS_1_KM_FILE), &segments.one_km_and_above)?,
        stage_table(&output_dir.join(ALL_ROADS_FILE), &roads.all)?,
        stage_table(&output_dir.join(ROADS_1_KM_FILE), &roads.one_km_and_above)?,
        stage_bytes(&summary_path, &json)?,
    ])?;

    info!(
        segments = summary.segments,
        roads = summary.roads,
        "Processing complete"
    );

    Ok(summary)
}

fn parse_reference(rows: &[Value]) -> Result<Vec<ReferenceSegment>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            ReferenceSegment::from_row(row).map_err(|reason| {
                PipelineError::fetch(Source::RoadSegments.name(), format!("row {i}: {reason}"))
            })
        })
        .collect()
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| PipelineError::io(path, e))
}
