//! Input workloads: one count series per entity.
//!
//! The on-disk layout is one CSV file per query template:
//!
//! ```text
//! 1532,"SELECT * FROM t WHERE id = $1"
//! 2016-10-31 17:50:00,12
//! 2016-10-31 17:51:00,3
//! ...
//! ```
//!
//! The first record is `total_count,template`; every following record is
//! `timestamp,count` with the timestamp in `%Y-%m-%d %H:%M:%S` (fractional seconds
//! are accepted). Anything else fails the load; the clustering core only ever sees
//! valid, ordered timestamps.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use log::{info, warn};

use crate::cluster::EntityId;
use crate::error::{Error, Result};
use crate::series::{SparseTimeSeries, Timestamp};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_FORMAT_FRACTIONAL: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Entities, their series, and their known total occurrence counts.
#[derive(Clone, Debug, Default)]
pub struct Workload {
    series: BTreeMap<EntityId, SparseTimeSeries>,
    totals: BTreeMap<EntityId, u64>,
    bounds: Option<(Timestamp, Timestamp)>,
}

impl Workload {
    /// Empty workload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from in-memory series; each entity's known total is its series sum.
    pub fn from_series<I>(entities: I) -> Self
    where
        I: IntoIterator<Item = (EntityId, SparseTimeSeries)>,
    {
        let mut workload = Self::new();
        for (entity, series) in entities {
            let total = series.total();
            workload.insert(entity, series, total);
        }
        workload
    }

    /// Add (or replace) an entity.
    ///
    /// `total` is the externally known occurrence count; it is only used for
    /// diagnostics and is expected to equal the series sum.
    pub fn insert(&mut self, entity: EntityId, series: SparseTimeSeries, total: u64) {
        if let (Some(first), Some(last)) = (series.first(), series.last()) {
            self.bounds = Some(match self.bounds {
                None => (first, last),
                Some((lo, hi)) => (lo.min(first), hi.max(last)),
            });
        }
        self.totals.insert(entity.clone(), total);
        self.series.insert(entity, series);
    }

    /// Load every file in `dir`, in file-name order.
    pub fn from_csv_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut paths: Vec<_> = fs::read_dir(dir.as_ref())?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        paths.retain(|p| p.is_file());
        paths.sort();

        let mut workload = Self::new();
        for path in &paths {
            let (entity, total, series) = load_csv_file(path)?;
            workload.insert(entity, series, total);
        }
        info!(
            "loaded {} entities from {} ({} occurrences)",
            workload.len(),
            dir.as_ref().display(),
            workload.totals.values().sum::<u64>()
        );
        workload.check_totals();
        Ok(workload)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True if there are no entities.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Earliest and latest observed timestamp over all entities.
    pub fn bounds(&self) -> Option<(Timestamp, Timestamp)> {
        self.bounds
    }

    /// Entity ids, ascending.
    pub fn entities(&self) -> btree_map::Keys<'_, EntityId, SparseTimeSeries> {
        self.series.keys()
    }

    /// Entities and their series, ascending by id.
    pub fn iter(&self) -> btree_map::Iter<'_, EntityId, SparseTimeSeries> {
        self.series.iter()
    }

    /// Series of `entity`.
    pub fn series(&self, entity: &str) -> Option<&SparseTimeSeries> {
        self.series.get(entity)
    }

    /// Known total of `entity`.
    pub fn total(&self, entity: &str) -> Option<u64> {
        self.totals.get(entity).copied()
    }

    /// Sum of all known totals.
    pub fn grand_total(&self) -> u64 {
        self.totals.values().sum()
    }

    /// Warn about entities whose known total disagrees with their series.
    ///
    /// Returns how many disagree.
    pub fn check_totals(&self) -> usize {
        let mut mismatched = 0;
        for (entity, series) in &self.series {
            let known = self.totals.get(entity).copied().unwrap_or(0);
            let summed = series.total();
            if known != summed {
                warn!("{entity:?}: known total {known} but series sums to {summed}");
                mismatched += 1;
            }
        }
        mismatched
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT_FRACTIONAL))
        .ok()
}

/// Load one template file: `(template, known total, series)`.
///
/// Repeated timestamps are summed.
pub fn load_csv_file<P: AsRef<Path>>(path: P) -> Result<(EntityId, u64, SparseTimeSeries)> {
    let path = path.as_ref();
    let malformed = |line: u64, reason: String| Error::MalformedRecord {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut records = rdr.records();

    let header = records
        .next()
        .ok_or_else(|| malformed(1, "missing `total,template` header".into()))??;
    if header.len() < 2 {
        return Err(malformed(1, "expected `total,template`".into()));
    }
    let total: u64 = header[0]
        .trim()
        .parse()
        .map_err(|e| malformed(1, format!("bad total {:?}: {e}", &header[0])))?;
    let template: EntityId = header[1].to_string();

    let mut series = SparseTimeSeries::new();
    for (i, record) in records.enumerate() {
        let line = i as u64 + 2;
        let record = record?;
        if record.len() < 2 {
            return Err(malformed(line, "expected `timestamp,count`".into()));
        }
        let at = parse_timestamp(&record[0])
            .ok_or_else(|| malformed(line, format!("bad timestamp {:?}", &record[0])))?;
        let count: u64 = record[1]
            .trim()
            .parse()
            .map_err(|e| malformed(line, format!("bad count {:?}: {e}", &record[1])))?;
        series.record(at, count);
    }
    Ok((template, total, series))
}
