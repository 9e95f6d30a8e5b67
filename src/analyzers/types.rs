//! Data types used by the aggregation pipeline.

use std::fmt;

use serde_json::Value;

use crate::error::ParseError;
use crate::parser::{scalar_to_string, value_as_f64, value_as_i64};
use crate::stats::{SegmentRecord, SeverityCounts};

/// A single row of the road segment reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSegment {
    pub segment_id: i64,
    pub road: String,
    pub from_km: f64,
    pub from_name: String,
    pub to_km: f64,
    pub to_name: String,
}

impl ReferenceSegment {
    /// Reads a reference row from either a fetched JSON object or a row
    /// loaded back from CSV, where every cell is a string.
    ///
    /// A null or absent `from_km`/`to_km` reads as `NaN`, so the segment
    /// stays joinable but gets an unknown length. A value that is present
    /// but not numeric is an error.
    pub fn from_row(row: &Value) -> Result<Self, ParseError> {
        let segment_id = row
            .get("segment_id")
            .and_then(value_as_i64)
            .ok_or(ParseError::InvalidReference("segment_id"))?;
        let road = row
            .get("road")
            .and_then(scalar_to_string)
            .ok_or(ParseError::InvalidReference("road"))?;
        let km = |field: &'static str| match row.get(field) {
            None | Some(Value::Null) => Ok(f64::NAN),
            Some(value) => value_as_f64(value).ok_or(ParseError::InvalidReference(field)),
        };
        let name = |field: &str| row.get(field).and_then(scalar_to_string).unwrap_or_default();

        Ok(ReferenceSegment {
            segment_id,
            road,
            from_km: km("from_km")?,
            from_name: name("from_name"),
            to_km: km("to_km")?,
            to_name: name("to_name"),
        })
    }
}

/// Derived safety metrics shared by segment and road rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyMetrics {
    pub fatal_severe_accidents: Option<i64>,
    pub fatal_severe_accidents_per_km: f64,
    pub fatal_accidents_per_km: f64,
}

/// A statistics record joined with its reference segment.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedSegmentRow {
    pub record: SegmentRecord,
    pub segment: ReferenceSegment,
    pub total_km: f64,
    pub metrics: SafetyMetrics,
}

/// Per-road rollup of [`JoinedSegmentRow`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadRow {
    pub road: String,
    pub total_km: f64,
    pub counts: SeverityCounts,
    pub from_name: String,
    pub to_name: String,
    pub metrics: SafetyMetrics,
}

/// One report cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Empty,
}

impl From<Option<i64>> for Cell {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Cell::Empty, Cell::Int)
    }
}

impl fmt::Display for Cell {
    /// CSV text of the cell. `NaN` prints empty, infinities as `inf`/`-inf`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) if v.is_nan() => Ok(()),
            Cell::Float(v) if v.is_infinite() => {
                f.write_str(if *v > 0.0 { "inf" } else { "-inf" })
            }
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Empty => Ok(()),
        }
    }
}

/// A row that can be rendered by column name.
pub trait ReportRow {
    fn cell(&self, column: &str) -> Cell;
    fn total_km(&self) -> f64;
}

impl ReportRow for JoinedSegmentRow {
    fn cell(&self, column: &str) -> Cell {
        match column {
            "road_segment_id" => Cell::Int(self.record.road_segment_id),
            "road_segment_name" => Cell::Text(self.record.road_segment_name.clone()),
            "segment_id" => Cell::Int(self.segment.segment_id),
            "road" => Cell::Text(self.segment.road.clone()),
            "from_km" => Cell::Float(self.segment.from_km),
            "from_name" => Cell::Text(self.segment.from_name.clone()),
            "to_km" => Cell::Float(self.segment.to_km),
            "to_name" => Cell::Text(self.segment.to_name.clone()),
            "total_km" => Cell::Float(self.total_km),
            other => self.metrics.cell(other).unwrap_or_else(|| self.record.counts.get(other).into()),
        }
    }

    fn total_km(&self) -> f64 {
        self.total_km
    }
}

impl ReportRow for RoadRow {
    fn cell(&self, column: &str) -> Cell {
        match column {
            "road" => Cell::Text(self.road.clone()),
            "total_km" => Cell::Float(self.total_km),
            "from_name" => Cell::Text(self.from_name.clone()),
            "to_name" => Cell::Text(self.to_name.clone()),
            other => self.metrics.cell(other).unwrap_or_else(|| self.counts.get(other).into()),
        }
    }

    fn total_km(&self) -> f64 {
        self.total_km
    }
}

impl SafetyMetrics {
    fn cell(&self, column: &str) -> Option<Cell> {
        match column {
            "fatal_severe_accidents" => Some(self.fatal_severe_accidents.into()),
            "fatal_severe_accidents_per_km" => Some(Cell::Float(self.fatal_severe_accidents_per_km)),
            "fatal_accidents_per_km" => Some(Cell::Float(self.fatal_accidents_per_km)),
            _ => None,
        }
    }
}

/// Ranked rows plus the columns selected for output.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<R> {
    pub columns: Vec<&'static str>,
    pub rows: Vec<R>,
}

impl<R: ReportRow + Clone> Table<R> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of at least `min_km` total length, in the same order and with
    /// the same columns. `NaN` lengths never qualify.
    pub fn with_min_km(&self, min_km: f64) -> Table<R> {
        Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| row.total_km() >= min_km)
                .cloned()
                .collect(),
        }
    }

    /// Cells of every row, in column order.
    pub fn records(&self) -> impl Iterator<Item = Vec<Cell>> + '_ {
        self.rows
            .iter()
            .map(|row| self.columns.iter().map(|c| row.cell(c)).collect())
    }
}

/// Full and 1 km-and-above views of one report.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedReport<R> {
    pub all: Table<R>,
    pub one_km_and_above: Table<R>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_from_json_row() {
        let row = json!({
            "segment_id": 5, "road": 90, "from_km": 0.0, "from_name": "A",
            "to_km": 12.5, "to_name": "B", "extra": "ignored"
        });
        let segment = ReferenceSegment::from_row(&row).unwrap();
        assert_eq!(segment.segment_id, 5);
        assert_eq!(segment.road, "90");
        assert_eq!(segment.to_km, 12.5);
        assert_eq!(segment.from_name, "A");
    }

    #[test]
    fn test_reference_from_csv_row() {
        let row = json!({
            "segment_id": "5", "road": "90", "from_km": "1", "from_name": null,
            "to_km": "2.5", "to_name": "B"
        });
        let segment = ReferenceSegment::from_row(&row).unwrap();
        assert_eq!(segment.from_km, 1.0);
        assert_eq!(segment.from_name, "");
    }

    #[test]
    fn test_reference_missing_km_is_unknown_length() {
        let row = json!({"segment_id": 5, "road": "1", "from_km": 0, "to_km": null});
        let segment = ReferenceSegment::from_row(&row).unwrap();
        assert_eq!(segment.from_km, 0.0);
        assert!(segment.to_km.is_nan());

        let row = json!({"segment_id": 5, "road": "1"});
        assert!(ReferenceSegment::from_row(&row).unwrap().from_km.is_nan());
    }

    #[test]
    fn test_reference_non_numeric_km() {
        let row = json!({"segment_id": 5, "road": "1", "from_km": "north", "to_km": 2});
        assert!(matches!(
            ReferenceSegment::from_row(&row),
            Err(ParseError::InvalidReference("from_km"))
        ));
        assert!(matches!(
            ReferenceSegment::from_row(&json!({"road": "1"})),
            Err(ParseError::InvalidReference("segment_id"))
        ));
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Int(3).to_string(), "3");
        assert_eq!(Cell::Float(0.8).to_string(), "0.8");
        assert_eq!(Cell::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(Cell::Float(f64::NEG_INFINITY).to_string(), "-inf");
        assert_eq!(Cell::Float(f64::NAN).to_string(), "");
        assert_eq!(Cell::from(None).to_string(), "");
        assert_eq!(Cell::Text("Y".into()).to_string(), "Y");
    }
}
