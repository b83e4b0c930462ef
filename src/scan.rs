use crate::error::ScanError;
use crate::index::IndexReader;
use crate::report::{self, Report, REPORT_EVERYTHING};
use crate::summary::{self, Summary};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Partitions smaller than this are counted but not reported.
    pub threshold: i64,
    /// Treat a file that does not exist as removed by compaction instead of failing.
    pub ignore_missing: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threshold: REPORT_EVERYTHING,
            ignore_missing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scanned {
    /// Number of partitions in the file, reported or not.
    Partitions(u64),
    Missing,
}

/// Loads a whole file. A missing file is `Ok(None)` when it may be tolerated.
fn load(path: &Path, ignore_missing: bool) -> Result<Option<Vec<u8>>, ScanError> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound && ignore_missing => {
            warn!(path = %path.display(), "file missing, possibly compacted");
            Ok(None)
        }
        Err(source) => Err(ScanError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Feeds every entry of an index file buffer to `report` and returns how many there were.
/// Entries decoded before an error have already been reported when it is returned.
pub fn scan_index(
    path: &Path,
    data: &[u8],
    threshold: i64,
    report: &mut dyn Report,
) -> Result<u64, ScanError> {
    report.begin_entries()?;

    let mut partitions = 0;
    for entry in IndexReader::new(data) {
        let entry = entry.map_err(|source| ScanError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        partitions += 1;
        report::report_entry(report, &entry, threshold)?;
    }

    report.end(partitions)?;
    debug!(path = %path.display(), partitions, "scanned index");

    Ok(partitions)
}

pub fn scan_index_file(
    path: &Path,
    options: &ScanOptions,
    report: &mut dyn Report,
) -> Result<Scanned, ScanError> {
    report.report_file(&path.display().to_string())?;

    match load(path, options.ignore_missing)? {
        Some(data) => scan_index(path, &data, options.threshold, report).map(Scanned::Partitions),
        None => Ok(Scanned::Missing),
    }
}

pub fn read_summary_file(path: &Path) -> Result<Summary, ScanError> {
    let data = load(path, false)?.unwrap_or_default();
    summary::decode(&data).map_err(|source| ScanError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
