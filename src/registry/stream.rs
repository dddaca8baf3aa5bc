use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use crate::{
    study::DutyCycle,
    time::{HourBucket, SECONDS_PER_HOUR},
};

/// Every observation of one hour bucket. More than one distinct size is a merge conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntry {
    pub sizes: BTreeSet<u64>,
    pub paths: BTreeSet<PathBuf>,
}

impl BucketEntry {
    pub fn is_conflict(&self) -> bool {
        self.sizes.len() > 1
    }
}

/// Observed over expected hour buckets within a stream's own observed span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub observed: u64,
    pub expected: u64,
}

impl Coverage {
    pub fn fraction(&self) -> f64 {
        if self.expected == 0 {
            return 0.0;
        }
        self.observed as f64 / self.expected as f64
    }
}

/// File inventory of one stream, keyed by hour bucket.
///
/// Merging takes the union of buckets and of the observations inside each bucket, so merge order
/// never changes the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInventory {
    buckets: BTreeMap<HourBucket, BucketEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coverage: Option<Coverage>,
}

impl StreamInventory {
    pub fn record(&mut self, bucket: HourBucket, size: u64, path: &Path) {
        let entry = self.buckets.entry(bucket).or_default();
        entry.sizes.insert(size);
        entry.paths.insert(path.to_path_buf());
    }

    pub fn merge(&mut self, other: StreamInventory) {
        for (bucket, entry) in other.buckets {
            let mine = self.buckets.entry(bucket).or_default();
            mine.sizes.extend(entry.sizes);
            mine.paths.extend(entry.paths);
        }
        // Coverage depends on the attached study and is recomputed after merges.
        self.coverage = None;
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn buckets(&self) -> &BTreeMap<HourBucket, BucketEntry> {
        &self.buckets
    }

    /// Number of distinct files, i.e. hour buckets.
    pub fn file_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bytes over every distinct observation.
    pub fn byte_total(&self) -> u64 {
        self.buckets
            .values()
            .flat_map(|entry| entry.sizes.iter())
            .sum()
    }

    pub fn first(&self) -> Option<&HourBucket> {
        self.buckets.keys().next()
    }

    pub fn last(&self) -> Option<&HourBucket> {
        self.buckets.keys().next_back()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = (&HourBucket, &BTreeSet<u64>)> {
        self.buckets
            .iter()
            .filter(|(_, entry)| entry.is_conflict())
            .map(|(bucket, entry)| (bucket, &entry.sizes))
    }

    pub fn coverage(&self) -> Option<Coverage> {
        self.coverage
    }

    /// Recompute coverage for `duty`, or clear it when no duty cycle is known.
    pub fn set_duty_cycle(&mut self, duty: Option<DutyCycle>) {
        self.coverage = duty.and_then(|duty| self.compute_coverage(duty));
    }

    fn compute_coverage(&self, duty: DutyCycle) -> Option<Coverage> {
        let first = self.first()?.hour_start();
        let last = self.last()?.hour_start();
        let span_hours = first.seconds_until(&last) / SECONDS_PER_HOUR + 1;
        let observed: BTreeSet<HourBucket> =
            self.buckets.keys().map(HourBucket::hour_start).collect();
        let expected = if duty.cycle_seconds <= SECONDS_PER_HOUR {
            span_hours
        } else {
            let span_seconds = span_hours.unsigned_abs().saturating_mul(SECONDS_PER_HOUR as u64);
            let cycles = span_seconds.div_ceil(duty.cycle_seconds.unsigned_abs());
            (cycles as i64).clamp(1, span_hours)
        };
        Some(Coverage {
            observed: observed.len() as u64,
            expected: expected as u64,
        })
    }
}
