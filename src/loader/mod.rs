//! Raw record loading for trip logs and weather logs.
//!
//! Each source has a declared field mapping ([`schema`]) validated against the
//! file header, and a single validity predicate that classifies every row into
//! a [`RecordOutcome`]. Dropped rows are counted by [`DropReason`], never fatal.

pub mod schema;
pub mod trips;
pub mod weather;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::PipelineConfig;

pub use trips::{TripEvent, TripRequirement};
pub use weather::WeatherObservation;

/// Why a single row was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    InvalidTimestamp,
    MissingIdentifier,
    /// A required measurement was empty, unparsable or a sentinel code.
    MissingField(&'static str),
    MissingEnd,
    NegativeDuration,
    DurationOutOfRange,
    /// The CSV reader could not decode the row at all.
    CsvError,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::InvalidTimestamp => write!(f, "invalid_timestamp"),
            DropReason::MissingIdentifier => write!(f, "missing_identifier"),
            DropReason::MissingField(field) => write!(f, "missing_{field}"),
            DropReason::MissingEnd => write!(f, "missing_end"),
            DropReason::NegativeDuration => write!(f, "negative_duration"),
            DropReason::DurationOutOfRange => write!(f, "duration_out_of_range"),
            DropReason::CsvError => write!(f, "csv_error"),
        }
    }
}

/// Result of the validity predicate for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome<T> {
    Valid(T),
    Dropped(DropReason),
}

/// Number of dropped rows per reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DropCounts(BTreeMap<String, usize>);

impl DropCounts {
    pub fn record(&mut self, reason: DropReason) {
        self.add(&reason.to_string(), 1);
    }

    /// Adds `count` drops under a free-form label (used by stages past loading).
    pub fn add(&mut self, label: &str, count: usize) {
        if count > 0 {
            *self.0.entry(label.to_string()).or_default() += count;
        }
    }

    pub fn merge(&mut self, other: &DropCounts) {
        for (label, count) in &other.0 {
            self.add(label, *count);
        }
    }

    pub fn get(&self, reason: DropReason) -> usize {
        self.0.get(&reason.to_string()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Filename conventions separating data files from metadata artifacts.
///
/// Filtering is by name only; file contents are never inspected to decide.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    pub suffix: String,
    pub skip_prefixes: Vec<String>,
    pub skip_dirs: Vec<String>,
}

impl SourceFilter {
    pub fn trips(config: &PipelineConfig) -> Self {
        Self {
            suffix: config.trip_file_suffix.clone(),
            skip_prefixes: config.skip_file_prefixes.clone(),
            skip_dirs: config.skip_dir_names.clone(),
        }
    }

    pub fn weather(config: &PipelineConfig) -> Self {
        Self {
            suffix: ".csv".to_string(),
            skip_prefixes: config.skip_file_prefixes.clone(),
            skip_dirs: config.skip_dir_names.clone(),
        }
    }

    pub fn accepts_file(&self, name: &str) -> bool {
        self.rejection(name).is_none()
    }

    /// Why a file name is passed over, or `None` if it is a data file.
    pub fn rejection(&self, name: &str) -> Option<&'static str> {
        if self.skip_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            Some(SKIPPED_PREFIX)
        } else if !name.ends_with(self.suffix.as_str()) {
            Some(WRONG_SUFFIX)
        } else {
            None
        }
    }

    pub fn skips_dir(&self, name: &str) -> bool {
        self.skip_dirs.iter().any(|d| d == name)
    }
}

pub const SKIPPED_PREFIX: &str = "skipped_prefix";
pub const WRONG_SUFFIX: &str = "wrong_suffix";
pub const SKIPPED_DIR: &str = "skipped_dir";

/// Accepted paths plus the number of entries passed over, per reason.
#[derive(Debug, Default)]
pub struct DiscoveredFiles {
    pub files: Vec<PathBuf>,
    pub skipped: DropCounts,
}

/// Lists accepted files in `dir`, descending into subdirectories when `recursive`.
/// The result is sorted so downstream merges are reproducible.
pub fn discover_files(
    dir: &Path,
    filter: &SourceFilter,
    recursive: bool,
) -> Result<DiscoveredFiles> {
    let mut found = DiscoveredFiles::default();
    collect_files(dir, filter, recursive, &mut found)?;
    found.files.sort();
    debug!(
        dir = %dir.display(),
        count = found.files.len(),
        skipped = found.skipped.total(),
        "Discovered source files"
    );
    Ok(found)
}

fn collect_files(
    dir: &Path,
    filter: &SourceFilter,
    recursive: bool,
    found: &mut DiscoveredFiles,
) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory '{}'", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_str().unwrap_or("");

        if entry.file_type()?.is_dir() {
            if !recursive {
                continue;
            }
            if filter.skips_dir(name) {
                found.skipped.add(SKIPPED_DIR, 1);
            } else {
                collect_files(&path, filter, recursive, found)?;
            }
            continue;
        }

        match filter.rejection(name) {
            None => found.files.push(path),
            Some(reason) => found.skipped.add(reason, 1),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn filter() -> SourceFilter {
        SourceFilter::trips(&PipelineConfig::default())
    }

    #[test]
    fn test_accepts_trip_file_by_suffix() {
        let f = filter();
        assert!(f.accepts_file("202301-divvy-tripdata.csv"));
        assert!(!f.accepts_file("._202301-divvy-tripdata.csv"));
        assert!(!f.accepts_file("202301-divvy-tripdata.zip"));
        assert!(!f.accepts_file("stations.csv"));
    }

    #[test]
    fn test_skips_metadata_directory() {
        assert!(filter().skips_dir("__MACOSX"));
        assert!(!filter().skips_dir("2023"));
    }

    #[test]
    fn test_drop_counts_merge_and_labels() {
        let mut a = DropCounts::default();
        a.record(DropReason::InvalidTimestamp);
        a.record(DropReason::MissingField("temperature"));

        let mut b = DropCounts::default();
        b.record(DropReason::InvalidTimestamp);
        b.add("conflicting_observations", 0);

        a.merge(&b);
        assert_eq!(a.get(DropReason::InvalidTimestamp), 2);
        assert_eq!(a.get(DropReason::MissingField("temperature")), 1);
        assert_eq!(a.total(), 3);
        assert_eq!(a.iter().count(), 2);
    }

    #[test]
    fn test_discover_files_walks_tree_and_filters_names() {
        let root = env::temp_dir().join("bikeshare_forecast_discover");
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("2023")).unwrap();
        fs::create_dir_all(root.join("__MACOSX/2023")).unwrap();

        fs::write(root.join("2023/202302-divvy-tripdata.csv"), "ride_id,started_at\n").unwrap();
        fs::write(root.join("202301-divvy-tripdata.csv"), "ride_id,started_at\n").unwrap();
        fs::write(root.join("2023/._202302-divvy-tripdata.csv"), "junk").unwrap();
        fs::write(root.join("__MACOSX/2023/202302-divvy-tripdata.csv"), "junk").unwrap();
        fs::write(root.join("README.txt"), "notes").unwrap();

        let found = discover_files(&root, &filter(), true).unwrap();
        let files = &found.files;
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(&root).unwrap().display().to_string())
            .collect();

        assert_eq!(files.len(), 2);
        assert!(names.iter().all(|n| !n.contains("__MACOSX") && !n.contains("._")));

        let skipped: Vec<(&str, usize)> = found.skipped.iter().collect();
        assert_eq!(
            skipped,
            vec![(SKIPPED_DIR, 1), (SKIPPED_PREFIX, 1), (WRONG_SUFFIX, 1)]
        );

        fs::remove_dir_all(&root).unwrap();
    }
}
