use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::analyzers::types::{JoinedSegmentRow, RankedReport, ReferenceSegment, Table};
use crate::analyzers::utility::{rank_by_severity, safety_metrics, MIN_REPORT_KM};
use crate::error::{PipelineError, Result};
use crate::stats::{present_columns, SegmentRecord, COUNT_COLUMNS};

/// Segment report columns, in output order.
pub const SEGMENT_COLUMNS: [&str; 22] = [
    "road_segment_id",
    "road",
    "road_segment_name",
    "from_km",
    "from_name",
    "to_km",
    "to_name",
    "total_km",
    "severity_fatal_count",
    "severity_severe_count",
    "severity_light_count",
    "start_year",
    "end_year",
    "total_accidents_count",
    "killed_count",
    "severe_injured_count",
    "light_injured_count",
    "total_injured_count",
    "segment_id",
    "fatal_severe_accidents",
    "fatal_severe_accidents_per_km",
    "fatal_accidents_per_km",
];

/// Inner-joins records to reference segments on
/// `road_segment_id = segment_id`, keeping record order.
///
/// Records without a reference segment are dropped. A repeated
/// `segment_id` yields one row per match.
pub fn join_segments(
    records: &[SegmentRecord],
    reference: &[ReferenceSegment],
) -> Result<Vec<JoinedSegmentRow>> {
    let mut by_id: HashMap<i64, Vec<&ReferenceSegment>> = HashMap::new();
    for segment in reference {
        by_id.entry(segment.segment_id).or_default().push(segment);
    }

    let duplicated = by_id.values().filter(|v| v.len() > 1).count();
    if duplicated > 0 {
        warn!(duplicated, "Reference table repeats segment ids");
    }

    let mut joined = Vec::with_capacity(records.len());
    for record in records {
        let Some(matches) = by_id.get(&record.road_segment_id) else {
            debug!(
                road_segment_id = record.road_segment_id,
                "No reference segment, dropping record"
            );
            continue;
        };

        for segment in matches {
            let total_km = segment.to_km - segment.from_km;
            let metrics = safety_metrics(&record.counts, total_km).map_err(|e| {
                PipelineError::overflow(format!("segment {}", record.road_segment_id), e)
            })?;
            joined.push(JoinedSegmentRow {
                record: record.clone(),
                segment: (*segment).clone(),
                total_km,
                metrics,
            });
        }
    }

    Ok(joined)
}

/// Builds the ranked segment report.
pub fn build_segment_report(
    records: &[SegmentRecord],
    reference: &[ReferenceSegment],
) -> Result<RankedReport<JoinedSegmentRow>> {
    let mut rows = join_segments(records, reference)?;
    let dropped = records.len().saturating_sub(rows.len());
    info!(joined = rows.len(), dropped, "Merged statistics with road segments");

    rank_by_severity(&mut rows, |row| &row.metrics);

    let present = present_columns(records);
    let columns = SEGMENT_COLUMNS
        .into_iter()
        .filter(|c| !COUNT_COLUMNS.contains(c) || present.contains(c))
        .collect();

    let all = Table { columns, rows };
    let one_km_and_above = all.with_min_km(MIN_REPORT_KM);

    Ok(RankedReport {
        all,
        one_km_and_above,
    })
}
