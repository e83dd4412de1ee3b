//! Ride counts per interval.

use anyhow::Result;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, warn};

use super::IntervalWidth;
use crate::loader::trips::for_each_trip;
use crate::loader::{DropCounts, TripRequirement};

/// Trip count per interval start. Merging sums counts on key collision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalCounts(BTreeMap<NaiveDateTime, u64>);

impl IntervalCounts {
    pub fn record(&mut self, width: IntervalWidth, started_at: NaiveDateTime) {
        self.add(width.floor(started_at), 1);
    }

    pub fn add(&mut self, interval: NaiveDateTime, count: u64) {
        *self.0.entry(interval).or_default() += count;
    }

    /// Folds `other` in; an interval present in both gets the sum of the two counts.
    pub fn merge(&mut self, other: IntervalCounts) {
        for (interval, count) in other.0 {
            self.add(interval, count);
        }
    }

    pub fn get(&self, interval: NaiveDateTime) -> u64 {
        self.0.get(&interval).copied().unwrap_or(0)
    }

    pub fn contains(&self, interval: NaiveDateTime) -> bool {
        self.0.contains_key(&interval)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Every interval from the first to the last observed one, with 0 for empty intervals.
    pub fn filled(&self, width: IntervalWidth) -> IntervalCounts {
        let (Some(first), Some(last)) = (self.0.keys().next(), self.0.keys().next_back()) else {
            return IntervalCounts::default();
        };

        let mut filled = BTreeMap::new();
        let mut cursor = *first;
        while cursor <= *last {
            filled.insert(cursor, self.get(cursor));
            cursor += width.step();
        }
        IntervalCounts(filled)
    }
}

/// Ride counts merged across every trip file.
#[derive(Debug, Default)]
pub struct RideCountLoad {
    pub counts: IntervalCounts,
    pub files: usize,
    pub trips: u64,
    pub drops: DropCounts,
}

fn count_trip_file(
    path: &std::path::Path,
    width: IntervalWidth,
    requirement: TripRequirement,
) -> Result<(IntervalCounts, DropCounts)> {
    let mut counts = IntervalCounts::default();
    let drops = for_each_trip(path, requirement, |trip| counts.record(width, trip.started_at))?;
    debug!(
        intervals = counts.len(),
        trips = counts.total(),
        dropped = drops.total(),
        "Trip file bucketed"
    );
    Ok((counts, drops))
}

/// Parses trip files concurrently (at most `concurrency` at once) and merges
/// their per-interval counts in file order.
#[tracing::instrument(skip(files), fields(file_count = files.len()))]
pub async fn load_ride_counts(
    files: Vec<PathBuf>,
    width: IntervalWidth,
    requirement: TripRequirement,
    concurrency: usize,
) -> Result<RideCountLoad> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(files.len());

    for path in files {
        let sem = semaphore.clone();
        let file_span = tracing::info_span!("trip_file", path = %path.display());

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await?;
                tokio::task::spawn_blocking(move || count_trip_file(&path, width, requirement))
                    .await?
            }
            .instrument(file_span),
        );
        tasks.push(task);
    }

    let mut load = RideCountLoad::default();
    for task in tasks {
        let (counts, drops) = task.await??;
        load.files += 1;
        load.drops.merge(&drops);
        load.counts.merge(counts);
    }
    load.trips = load.counts.total();

    if load.counts.is_empty() {
        warn!(files = load.files, "No valid trips loaded");
    }

    info!(
        files = load.files,
        trips = load.trips,
        intervals = load.counts.len(),
        dropped = load.drops.total(),
        "Loaded ride counts"
    );
    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::TripEvent;
    use chrono::NaiveDate;
    use std::env;
    use std::fs;

    fn bucket_trips(trips: &[TripEvent], width: IntervalWidth) -> IntervalCounts {
        let mut counts = IntervalCounts::default();
        for trip in trips {
            counts.record(width, trip.started_at);
        }
        counts
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 5, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn trip(started_at: NaiveDateTime) -> TripEvent {
        TripEvent {
            ride_id: "r".to_string(),
            started_at,
            ended_at: None,
        }
    }

    #[test]
    fn test_bucket_counts_trips_per_hour() {
        let trips = vec![trip(at(1, 8, 5)), trip(at(1, 8, 59)), trip(at(1, 9, 0))];
        let counts = bucket_trips(&trips, IntervalWidth::Hourly);

        assert_eq!(counts.get(at(1, 8, 0)), 2);
        assert_eq!(counts.get(at(1, 9, 0)), 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_daily_width_is_a_parameter() {
        let trips = vec![trip(at(1, 8, 5)), trip(at(1, 23, 59)), trip(at(2, 0, 0))];
        let counts = bucket_trips(&trips, IntervalWidth::Daily);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get(at(1, 0, 0)), 2);
    }

    #[test]
    fn test_merge_sums_overlapping_intervals() {
        let mut a = bucket_trips(&[trip(at(1, 8, 10))], IntervalWidth::Hourly);
        let b = bucket_trips(&[trip(at(1, 8, 40)), trip(at(1, 10, 0))], IntervalWidth::Hourly);
        a.merge(b);

        assert_eq!(a.get(at(1, 8, 0)), 2);
        assert_eq!(a.get(at(1, 10, 0)), 1);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_filled_inserts_zero_intervals() {
        let counts = bucket_trips(&[trip(at(1, 8, 10)), trip(at(1, 11, 0))], IntervalWidth::Hourly);
        let filled = counts.filled(IntervalWidth::Hourly);

        assert_eq!(filled.len(), 4);
        assert_eq!(filled.get(at(1, 9, 0)), 0);
        assert_eq!(filled.total(), 2);
        assert!(IntervalCounts::default().filled(IntervalWidth::Hourly).is_empty());
    }

    #[tokio::test]
    async fn test_load_ride_counts_merges_files_covering_same_hours() {
        let dir = env::temp_dir().join("bikeshare_forecast_ride_counts");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let a = dir.join("202305-divvy-tripdata.csv");
        let b = dir.join("202305b-divvy-tripdata.csv");
        fs::write(
            &a,
            "ride_id,started_at\nA,2023-05-01 08:10:00\nB,2023-05-01 09:10:00\n",
        )
        .unwrap();
        fs::write(&b, "ride_id,started_at\nC,2023-05-01 08:50:00\nD,bad\n").unwrap();

        let load = load_ride_counts(
            vec![a, b],
            IntervalWidth::Hourly,
            TripRequirement::StartOnly,
            2,
        )
        .await
        .unwrap();

        assert_eq!(load.files, 2);
        assert_eq!(load.trips, 3);
        assert_eq!(load.counts.get(at(1, 8, 0)), 2);
        assert_eq!(load.drops.total(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
