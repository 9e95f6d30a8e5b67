//! Output formatting and persistence for reports and raw source rows.
//!
//! Every file is written to a temporary file next to its destination and
//! renamed into place, so a reader sees either the previous file or the new
//! one in full.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::analyzers::types::{ReportRow, Table};
use crate::error::{PipelineError, Result};

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A file fully written to a temporary sibling of its destination, not yet
/// moved into place. Dropping it removes the temporary file.
#[derive(Debug)]
pub struct Staged {
    tmp: NamedTempFile,
    path: PathBuf,
}

impl Staged {
    /// Renames the temporary file over the destination.
    pub fn commit(self) -> Result<()> {
        let Staged { tmp, path } = self;
        tmp.persist(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(())
    }
}

/// Writes the contents for `path` into a synced temporary file in the same
/// directory.
pub fn stage(path: &Path, write: impl FnOnce(&mut File) -> std::io::Result<()>) -> Result<Staged> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(path, e))?;
    write(tmp.as_file_mut()).map_err(|e| PipelineError::io(path, e))?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| PipelineError::io(path, e))?;

    Ok(Staged {
        tmp,
        path: path.to_path_buf(),
    })
}

/// Moves every staged file into place, in order.
pub fn commit_all(staged: Vec<Staged>) -> Result<()> {
    debug!(files = staged.len(), "Committing staged files");
    staged.into_iter().try_for_each(Staged::commit)
}

/// Writes `path` through a sibling temporary file, replacing any previous
/// file only once `write` has succeeded.
pub fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> Result<()> {
    stage(path, write)?.commit()
}

/// Stages a report table as CSV with a header row.
pub fn stage_table<R: ReportRow + Clone>(path: &Path, table: &Table<R>) -> Result<Staged> {
    debug!(path = %path.display(), rows = table.len(), "Writing report");

    stage(path, |file| {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(&table.columns)?;
        for cells in table.records() {
            writer.write_record(cells.iter().map(ToString::to_string))?;
        }
        writer.flush()
    })
}

/// Top-level keys of `rows`, in order of first appearance.
pub fn raw_columns(rows: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in rows.iter().filter_map(Value::as_object).flat_map(Map::keys) {
        if !columns.contains(key) {
            columns.push(key.clone());
        }
    }
    columns
}

/// Persists fetched rows as CSV, one column per top-level key.
///
/// Strings are written verbatim, null and missing keys as empty cells, and
/// nested arrays or objects as their JSON text.
pub fn write_raw_rows(path: &Path, rows: &[Value]) -> Result<()> {
    let columns = raw_columns(rows);
    debug!(path = %path.display(), rows = rows.len(), columns = columns.len(), "Writing raw rows");

    write_atomically(path, |file| {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if !columns.is_empty() {
            writer.write_record(&columns)?;
        }
        for row in rows {
            writer.write_record(columns.iter().map(|c| raw_cell(row.get(c))))?;
        }
        writer.flush()
    })
}

fn raw_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Loads rows written by [`write_raw_rows`]. Every cell comes back as a
/// string and empty cells as null.
pub fn load_raw_rows(path: &Path) -> Result<Vec<Value>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut rdr = csv::Reader::from_reader(file);

    let headers = rdr.headers().map_err(|e| PipelineError::io(path, e))?.clone();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| PipelineError::io(path, e))?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (header.to_string(), value)
            })
            .collect();
        rows.push(Value::Object(row));
    }

    Ok(rows)
}

/// Stages raw bytes. Used for JSON side files.
pub fn stage_bytes(path: &Path, bytes: &[u8]) -> Result<Staged> {
    stage(path, |file| file.write_all(bytes))
}
