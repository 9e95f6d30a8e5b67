//! Flattening of per-segment statistics rows.
//!
//! Each statistics row carries a JSON-encoded document with the segment's
//! location and a list of named widgets. Two widgets hold the counts used by
//! the reports; their `items` are merged into one flat record.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{CountOverflow, ExtractionError, PipelineError};
use crate::parser::{decode_data, scalar_to_string, value_as_i64};

pub const ACCIDENT_WIDGET: &str = "accident_count_by_severity";
pub const INJURED_WIDGET: &str = "injured_count_by_severity";

/// Count columns a record may carry, in report order.
pub const COUNT_COLUMNS: [&str; 10] = [
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
];

/// Severity and injury counts of one segment or road. `None` means the
/// source did not report the item.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SeverityCounts {
    pub severity_fatal_count: Option<i64>,
    pub severity_severe_count: Option<i64>,
    pub severity_light_count: Option<i64>,
    pub start_year: Option<i64>,
    pub end_year: Option<i64>,
    pub total_accidents_count: Option<i64>,
    pub killed_count: Option<i64>,
    pub severe_injured_count: Option<i64>,
    pub light_injured_count: Option<i64>,
    pub total_injured_count: Option<i64>,
}

impl SeverityCounts {
    /// Value of a count column by name. Unknown names give `None`.
    pub fn get(&self, column: &str) -> Option<i64> {
        match column {
            "severity_fatal_count" => self.severity_fatal_count,
            "severity_severe_count" => self.severity_severe_count,
            "severity_light_count" => self.severity_light_count,
            "start_year" => self.start_year,
            "end_year" => self.end_year,
            "total_accidents_count" => self.total_accidents_count,
            "killed_count" => self.killed_count,
            "severe_injured_count" => self.severe_injured_count,
            "light_injured_count" => self.light_injured_count,
            "total_injured_count" => self.total_injured_count,
            _ => None,
        }
    }

    pub fn slot_mut(&mut self, column: &str) -> Option<&mut Option<i64>> {
        match column {
            "severity_fatal_count" => Some(&mut self.severity_fatal_count),
            "severity_severe_count" => Some(&mut self.severity_severe_count),
            "severity_light_count" => Some(&mut self.severity_light_count),
            "start_year" => Some(&mut self.start_year),
            "end_year" => Some(&mut self.end_year),
            "total_accidents_count" => Some(&mut self.total_accidents_count),
            "killed_count" => Some(&mut self.killed_count),
            "severe_injured_count" => Some(&mut self.severe_injured_count),
            "light_injured_count" => Some(&mut self.light_injured_count),
            "total_injured_count" => Some(&mut self.total_injured_count),
            _ => None,
        }
    }

    /// Builds counts from merged widget items. Keys outside
    /// [`COUNT_COLUMNS`] are skipped.
    pub fn from_items(items: &BTreeMap<String, Value>) -> Result<Self, ExtractionError> {
        let mut counts = SeverityCounts::default();

        for (key, value) in items {
            let Some(slot) = counts.slot_mut(key) else {
                debug!(key = %key, "Skipping widget item with no report column");
                continue;
            };
            *slot = match value {
                Value::Null => None,
                other => Some(
                    value_as_i64(other).ok_or_else(|| ExtractionError::InvalidItem(key.clone()))?,
                ),
            };
        }
        counts.fatal_severe()?;

        Ok(counts)
    }

    /// `severity_fatal_count + severity_severe_count`, if both are known.
    pub fn fatal_severe(&self) -> Result<Option<i64>, CountOverflow> {
        match (self.severity_fatal_count, self.severity_severe_count) {
            (Some(fatal), Some(severe)) => fatal
                .checked_add(severe)
                .map(Some)
                .ok_or(CountOverflow("fatal_severe_accidents")),
            _ => Ok(None),
        }
    }
}

/// One statistics row, flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub road_segment_id: i64,
    pub road_segment_name: String,
    pub counts: SeverityCounts,
}

impl SegmentRecord {
    /// Decodes the row's `data` document and flattens the location block
    /// and the two count widgets into a record.
    ///
    /// # Errors
    ///
    /// Fails if `data` is absent or undecodable, a location field is missing,
    /// or either count widget is missing, duplicated or malformed.
    pub fn from_row(row: &Value) -> Result<Self, ExtractionError> {
        let data = decode_data(row)
            .ok_or(ExtractionError::MissingData)?
            .map_err(|e| ExtractionError::InvalidData(e.to_string()))?;

        let location = &data["meta"]["location_info"];

        let road_segment_id = match location.get("road_segment_id") {
            None | Some(Value::Null) => {
                return Err(ExtractionError::MissingField("road_segment_id"));
            }
            Some(id) => value_as_i64(id).ok_or(ExtractionError::InvalidField {
                field: "road_segment_id",
                expected: "an integer",
            })?,
        };

        let road_segment_name = location
            .get("road_segment_name")
            .and_then(scalar_to_string)
            .ok_or(ExtractionError::MissingField("road_segment_name"))?;

        let widgets = data["widgets"]
            .as_array()
            .ok_or(ExtractionError::MissingField("widgets"))?;

        let accidents = widget_items(find_widget(widgets, ACCIDENT_WIDGET)?, ACCIDENT_WIDGET)?;
        let injured = widget_items(find_widget(widgets, INJURED_WIDGET)?, INJURED_WIDGET)?;

        let merged = merge_items(accidents, injured);

        Ok(SegmentRecord {
            road_segment_id,
            road_segment_name,
            counts: SeverityCounts::from_items(&merged)?,
        })
    }
}

/// Extracts every statistics row, in order. The first bad row aborts.
pub fn extract_records(rows: &[Value]) -> Result<Vec<SegmentRecord>, PipelineError> {
    rows.iter()
        .enumerate()
        .map(|(row, value)| {
            SegmentRecord::from_row(value).map_err(|error| PipelineError::Extraction { row, error })
        })
        .collect()
}

/// Count columns that at least one record reports, in report order.
pub fn present_columns(records: &[SegmentRecord]) -> Vec<&'static str> {
    COUNT_COLUMNS
        .into_iter()
        .filter(|column| records.iter().any(|r| r.counts.get(column).is_some()))
        .collect()
}

/// Merges two item lists into one mapping. On a key collision the later
/// value wins, whether it comes from `overlay` or from a repeated key within
/// the same list.
pub fn merge_items(
    base: Vec<(String, Value)>,
    overlay: Vec<(String, Value)>,
) -> BTreeMap<String, Value> {
    let mut merged = BTreeMap::new();
    for (key, value) in base.into_iter().chain(overlay) {
        if let Some(previous) = merged.insert(key.clone(), value) {
            debug!(key = %key, previous = %previous, "Widget item overwritten");
        }
    }
    merged
}

fn find_widget<'a>(widgets: &'a [Value], name: &'static str) -> Result<&'a Value, ExtractionError> {
    let matches: Vec<&Value> = widgets
        .iter()
        .filter(|w| w["name"].as_str() == Some(name))
        .collect();

    match matches.as_slice() {
        [widget] => Ok(*widget),
        [] => Err(ExtractionError::MissingWidget(name)),
        _ => Err(ExtractionError::DuplicateWidget {
            name,
            count: matches.len(),
        }),
    }
}

/// Reads `data.items` of a widget as key/value pairs. Both a list of
/// `[key, value]` pairs and a plain object are accepted.
fn widget_items(widget: &Value, name: &'static str) -> Result<Vec<(String, Value)>, ExtractionError> {
    match &widget["data"]["items"] {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::Array(pairs) => pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([Value::String(key), value]) => Ok((key.clone(), value.clone())),
                _ => Err(ExtractionError::MalformedItems(name)),
            })
            .collect(),
        _ => Err(ExtractionError::MalformedItems(name)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A statistics row shaped like the live source: `data` is a JSON string.
    pub(crate) fn stats_row(id: i64, name: &str, accidents: Value, injured: Value) -> Value {
        let data = json!({
            "meta": {
                "location_info": {"road_segment_id": id, "road_segment_name": name},
            },
            "widgets": [
                {"name": "street_view", "data": {"items": []}},
                {"name": ACCIDENT_WIDGET, "data": {"items": accidents}},
                {"name": INJURED_WIDGET, "data": {"items": injured}},
            ]
        });
        json!({"id": id, "data": data.to_string()})
    }

    #[test]
    fn test_from_row_flattens_both_widgets() {
        let row = stats_row(
            7,
            "Junction A - Junction B",
            json!([["severity_fatal_count", 2], ["severity_severe_count", 5], ["start_year", 2020]]),
            json!([["killed_count", 3], ["total_injured_count", 40]]),
        );

        let record = SegmentRecord::from_row(&row).unwrap();

        assert_eq!(record.road_segment_id, 7);
        assert_eq!(record.road_segment_name, "Junction A - Junction B");
        assert_eq!(record.counts.severity_fatal_count, Some(2));
        assert_eq!(record.counts.severity_severe_count, Some(5));
        assert_eq!(record.counts.start_year, Some(2020));
        assert_eq!(record.counts.killed_count, Some(3));
        assert_eq!(record.counts.total_injured_count, Some(40));
        assert_eq!(record.counts.severity_light_count, None);
        assert_eq!(record.counts.fatal_severe(), Ok(Some(7)));
    }

    #[test]
    fn test_from_row_accepts_object_items_and_inline_data() {
        let row = json!({
            "data": {
                "meta": {"location_info": {"road_segment_id": "12", "road_segment_name": "S"}},
                "widgets": [
                    {"name": ACCIDENT_WIDGET, "data": {"items": {"severity_fatal_count": 1}}},
                    {"name": INJURED_WIDGET, "data": {"items": {"killed_count": 1}}},
                ]
            }
        });

        let record = SegmentRecord::from_row(&row).unwrap();
        assert_eq!(record.road_segment_id, 12);
        assert_eq!(record.counts.severity_fatal_count, Some(1));
    }

    #[test]
    fn test_missing_accident_widget_is_an_error() {
        let data = json!({
            "meta": {"location_info": {"road_segment_id": 1, "road_segment_name": "S"}},
            "widgets": [{"name": INJURED_WIDGET, "data": {"items": []}}]
        });
        let row = json!({"data": data.to_string()});

        assert_eq!(
            SegmentRecord::from_row(&row),
            Err(ExtractionError::MissingWidget(ACCIDENT_WIDGET))
        );
    }

    #[test]
    fn test_duplicate_widget_is_an_error() {
        let data = json!({
            "meta": {"location_info": {"road_segment_id": 1, "road_segment_name": "S"}},
            "widgets": [
                {"name": ACCIDENT_WIDGET, "data": {"items": []}},
                {"name": INJURED_WIDGET, "data": {"items": []}},
                {"name": INJURED_WIDGET, "data": {"items": []}},
            ]
        });
        let row = json!({"data": data.to_string()});

        assert_eq!(
            SegmentRecord::from_row(&row),
            Err(ExtractionError::DuplicateWidget {
                name: INJURED_WIDGET,
                count: 2
            })
        );
    }

    #[test]
    fn test_missing_location_is_an_error() {
        let data = json!({"meta": {}, "widgets": []});
        let row = json!({"data": data.to_string()});
        assert_eq!(
            SegmentRecord::from_row(&row),
            Err(ExtractionError::MissingField("road_segment_id"))
        );
    }

    #[test]
    fn test_undecodable_data_is_an_error() {
        let row = json!({"data": "{oops"});
        assert!(matches!(
            SegmentRecord::from_row(&row),
            Err(ExtractionError::InvalidData(_))
        ));
        assert_eq!(
            SegmentRecord::from_row(&json!({"id": 1})),
            Err(ExtractionError::MissingData)
        );
    }

    #[test]
    fn test_malformed_items_are_an_error() {
        let row = stats_row(1, "S", json!([["severity_fatal_count"]]), json!([]));
        assert_eq!(
            SegmentRecord::from_row(&row),
            Err(ExtractionError::MalformedItems(ACCIDENT_WIDGET))
        );

        let row = stats_row(1, "S", json!([["severity_fatal_count", "many"]]), json!([]));
        assert_eq!(
            SegmentRecord::from_row(&row),
            Err(ExtractionError::InvalidItem("severity_fatal_count".into()))
        );
    }

    #[test]
    fn test_counts_whose_sum_overflows_are_rejected() {
        let row = stats_row(
            1,
            "S",
            json!([["severity_fatal_count", i64::MAX], ["severity_severe_count", 1]]),
            json!([]),
        );
        assert_eq!(
            SegmentRecord::from_row(&row),
            Err(ExtractionError::Overflow(CountOverflow("fatal_severe_accidents")))
        );

        let row = stats_row(
            1,
            "S",
            json!([["severity_fatal_count", i64::MAX], ["severity_severe_count", 0]]),
            json!([]),
        );
        let record = SegmentRecord::from_row(&row).unwrap();
        assert_eq!(record.counts.fatal_severe(), Ok(Some(i64::MAX)));
    }

    #[test]
    fn test_merge_items_last_writer_wins() {
        let base = vec![
            ("total_accidents_count".to_string(), json!(10)),
            ("severity_fatal_count".to_string(), json!(1)),
        ];
        let overlay = vec![("total_accidents_count".to_string(), json!(99))];

        let merged = merge_items(base, overlay);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["total_accidents_count"], json!(99));
        assert_eq!(merged["severity_fatal_count"], json!(1));
    }

    #[test]
    fn test_colliding_widget_keys_take_injured_value() {
        let row = stats_row(
            3,
            "S",
            json!([["start_year", 2019], ["severity_fatal_count", 0]]),
            json!([["start_year", 2021]]),
        );
        let record = SegmentRecord::from_row(&row).unwrap();
        assert_eq!(record.counts.start_year, Some(2021));
    }

    #[test]
    fn test_extract_records_reports_failing_row() {
        let rows = vec![
            stats_row(1, "S1", json!([]), json!([])),
            json!({"data": json!({"meta": {}, "widgets": []}).to_string()}),
        ];

        match extract_records(&rows) {
            Err(PipelineError::Extraction { row, .. }) => assert_eq!(row, 1),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn test_present_columns_keeps_report_order() {
        let rows = vec![
            stats_row(1, "S1", json!([["severity_severe_count", 1]]), json!([])),
            stats_row(2, "S2", json!([["severity_fatal_count", 0]]), json!([["killed_count", 0]])),
        ];
        let records = extract_records(&rows).unwrap();

        assert_eq!(
            present_columns(&records),
            vec!["severity_fatal_count", "severity_severe_count", "killed_count"]
        );
    }
}
