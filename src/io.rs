//! Snapshot discovery and CSV reading/writing around the merge/prune core.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{AggError, Result};
use crate::{PhylogenyTables, SnapshotBatch, SnapshotRecord};

/// Resolve a glob pattern to the snapshot files it names, sorted by path.
pub fn discover_snapshots(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = glob::glob(pattern)?
        .map(|entry| entry.map_err(|e| AggError::Io(e.into_error())))
        .collect::<Result<Vec<_>>>()?;
    if paths.is_empty() {
        return Err(AggError::NoFilesMatched(pattern.to_string()));
    }
    paths.sort();
    Ok(paths)
}

/// Pulls the time step out of a snapshot file name.
#[derive(Clone, Debug)]
pub struct TimeExtractor {
    regex: Regex,
}

impl TimeExtractor {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// Only the final path component is searched, so digits in directory
    /// names do not leak into the time step.
    pub fn extract(&self, path: &Path) -> Result<i64> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        let found = self.regex.find(&name).ok_or_else(|| AggError::TimeLabel {
            path: path.to_path_buf(),
            reason: format!("pattern '{}' did not match", self.regex.as_str()),
        })?;
        found.as_str().parse::<i64>().map_err(|e| AggError::TimeLabel {
            path: path.to_path_buf(),
            reason: format!("'{}' is not an integer: {e}", found.as_str()),
        })
    }
}

pub fn read_snapshot(path: &Path, time: i64) -> Result<SnapshotBatch> {
    let csv_err = |source| AggError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let records = reader
        .deserialize::<SnapshotRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(csv_err)?;
    Ok(SnapshotBatch::new(time, records))
}

/// Locations of the two output tables for a given file root.
pub fn output_paths(root: &str) -> (PathBuf, PathBuf) {
    (
        PathBuf::from(format!("{root}_edges.csv")),
        PathBuf::from(format!("{root}_sizes.csv")),
    )
}

/// Column headers of the edge table.
pub const EDGE_COLUMNS: [&str; 7] = [
    "ChildId",
    "ParentId",
    "origin_time",
    "destruction_time",
    "info",
    "tot_orgs",
    "total_offspring",
];

/// Column headers of the size table.
pub const SIZE_COLUMNS: [&str; 4] = ["Id", "Step", "Pop", "info"];

/// Temporaries live next to the target so `persist` is a same-filesystem rename.
fn staging_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

// Headers are written by hand so an empty table still gets them.
fn stage_rows<T: Serialize>(target: &Path, columns: &[&str], rows: &[T]) -> Result<NamedTempFile> {
    let csv_err = |source| AggError::Csv {
        path: target.to_path_buf(),
        source,
    };
    let mut staged = NamedTempFile::new_in(staging_dir(target))?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut staged);
        writer.write_record(columns).map_err(csv_err)?;
        for row in rows {
            writer.serialize(row).map_err(csv_err)?;
        }
        writer.flush()?;
    }
    Ok(staged)
}

/// Write `<root>_edges.csv` and `<root>_sizes.csv`, returning their paths.
///
/// Both tables are staged first and only moved into place once both are
/// complete; on failure neither output path is left behind.
pub fn write_tables(tables: &PhylogenyTables, root: &str) -> Result<(PathBuf, PathBuf)> {
    let (edges, sizes) = output_paths(root);
    let staged_edges = stage_rows(&edges, &EDGE_COLUMNS, &tables.lineages)?;
    let staged_sizes = stage_rows(&sizes, &SIZE_COLUMNS, &tables.observations)?;

    staged_edges.persist(&edges).map_err(|e| AggError::Io(e.error))?;
    if let Err(e) = staged_sizes.persist(&sizes) {
        if let Err(cleanup) = fs::remove_file(&edges) {
            warn!(path = %edges.display(), error = %cleanup, "could not remove partial output");
        }
        return Err(AggError::Io(e.error));
    }
    Ok((edges, sizes))
}
