use std::collections::BTreeMap;

use tracing::info;

use crate::analyzers::types::{JoinedSegmentRow, RankedReport, RoadRow, Table};
use crate::analyzers::utility::{checked_sum, rank_by_severity, safety_metrics, MIN_REPORT_KM};
use crate::error::{CountOverflow, PipelineError, Result};
use crate::stats::SeverityCounts;

/// Count columns summed per road, in output order.
pub const SUMMED_COLUMNS: [&str; 8] = [
    "severity_fatal_count",
    "severity_severe_count",
    "severity_light_count",
    "total_accidents_count",
    "killed_count",
    "severe_injured_count",
    "light_injured_count",
    "total_injured_count",
];

/// Rolls a segment table up to one row per road.
///
/// `segments` is the full segment table, including segments under 1 km.
/// Only count columns listed in the segment table's columns are summed.
pub fn build_road_report(segments: &Table<JoinedSegmentRow>) -> Result<RankedReport<RoadRow>> {
    let summed: Vec<&'static str> = SUMMED_COLUMNS
        .into_iter()
        .filter(|c| segments.columns.contains(c))
        .collect();

    let mut groups: BTreeMap<&str, Vec<&JoinedSegmentRow>> = BTreeMap::new();
    for row in &segments.rows {
        groups.entry(row.segment.road.as_str()).or_default().push(row);
    }

    let mut rows: Vec<RoadRow> = groups
        .into_iter()
        .map(|(road, members)| {
            roll_up(road, &members, &summed)
                .map_err(|e| PipelineError::overflow(format!("road {road}"), e))
        })
        .collect::<Result<_>>()?;

    rank_by_severity(&mut rows, |row| &row.metrics);
    info!(roads = rows.len(), "Aggregated segments by road");

    let mut columns = vec!["road", "total_km"];
    columns.extend(summed.iter().copied());
    columns.extend([
        "from_name",
        "to_name",
        "fatal_severe_accidents",
        "fatal_severe_accidents_per_km",
        "fatal_accidents_per_km",
    ]);

    let all = Table { columns, rows };
    let one_km_and_above = all.with_min_km(MIN_REPORT_KM);

    Ok(RankedReport {
        all,
        one_km_and_above,
    })
}

/// Sums one road's segments. Unreported counts add nothing.
///
/// `from_name` comes from the segment with the lowest `from_km` (the first
/// one on ties) and `to_name` from the segment with the highest `to_km`
/// (the last one on ties).
fn roll_up(
    road: &str,
    members: &[&JoinedSegmentRow],
    summed: &[&'static str],
) -> Result<RoadRow, CountOverflow> {
    let mut counts = SeverityCounts::default();
    for &column in summed {
        let total = checked_sum(column, members.iter().filter_map(|m| m.record.counts.get(column)))?;
        if let Some(slot) = counts.slot_mut(column) {
            *slot = Some(total);
        }
    }

    let total_km: f64 = members.iter().map(|m| m.total_km).sum();

    let mut first = members[0];
    let mut last = members[0];
    for &member in &members[1..] {
        if member.segment.from_km < first.segment.from_km {
            first = member;
        }
        if member.segment.to_km >= last.segment.to_km {
            last = member;
        }
    }

    Ok(RoadRow {
        road: road.to_string(),
        total_km,
        metrics: safety_metrics(&counts, total_km)?,
        counts,
        from_name: first.segment.from_name.clone(),
        to_name: last.segment.to_name.clone(),
    })
}
