use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use super::{
    device::{distinct_devices, DeviceRecord, PhoneOs},
    stream::StreamInventory,
};
use crate::{
    config::{ScanConfig, IDENTIFIERS_STREAM},
    error::RegistryError,
    study::Study,
    summary::Summary,
    time::{days_between, HourBucket},
};

/// One `(stream, survey, bucket)` observed with more than one byte size.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MergeConflict {
    pub user_id: String,
    pub stream: String,
    /// Survey identifier for survey streams.
    pub survey: Option<String>,
    pub bucket: HourBucket,
    pub sizes: BTreeSet<u64>,
}

/// Inventory of one user's raw data, possibly merged from several roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistry {
    pub user_id: String,
    /// User directories this registry was built from.
    pub sources: BTreeSet<PathBuf>,
    pub devices: BTreeSet<DeviceRecord>,
    pub passive: BTreeMap<String, StreamInventory>,
    /// Survey stream name -> survey identifier -> inventory.
    pub surveys: BTreeMap<String, BTreeMap<String, StreamInventory>>,
    pub irregular_directories: BTreeSet<String>,
    pub unregistered_files: BTreeSet<PathBuf>,
}

impl UserRegistry {
    pub fn new(user_id: &str) -> UserRegistry {
        UserRegistry {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    /// Union another registry of the same user into this one.
    pub fn merge(&mut self, other: UserRegistry) -> Result<(), RegistryError> {
        if other.user_id != self.user_id {
            return Err(RegistryError::Command(format!(
                "cannot merge registry of {} into {}",
                other.user_id, self.user_id
            )));
        }
        self.sources.extend(other.sources);
        self.devices.extend(other.devices);
        for (stream, inventory) in other.passive {
            self.passive.entry(stream).or_default().merge(inventory);
        }
        for (stream, surveys) in other.surveys {
            let mine = self.surveys.entry(stream).or_default();
            for (survey, inventory) in surveys {
                mine.entry(survey).or_default().merge(inventory);
            }
        }
        self.irregular_directories.extend(other.irregular_directories);
        self.unregistered_files.extend(other.unregistered_files);
        Ok(())
    }

    /// Every inventory with its stream name and, for survey streams, its survey identifier.
    pub fn inventories(&self) -> impl Iterator<Item = (&str, Option<&str>, &StreamInventory)> {
        let passive = self
            .passive
            .iter()
            .map(|(stream, inv)| (stream.as_str(), None, inv));
        let surveys = self.surveys.iter().flat_map(|(stream, surveys)| {
            surveys
                .iter()
                .map(move |(survey, inv)| (stream.as_str(), Some(survey.as_str()), inv))
        });
        passive.chain(surveys)
    }

    /// True if any stream other than `identifiers` holds a file.
    pub fn has_data(&self) -> bool {
        self.inventories()
            .any(|(stream, _, inv)| stream != IDENTIFIERS_STREAM && !inv.is_empty())
    }

    pub fn first(&self) -> Option<HourBucket> {
        self.inventories().filter_map(|(_, _, inv)| inv.first().copied()).min()
    }

    pub fn last(&self) -> Option<HourBucket> {
        self.inventories().filter_map(|(_, _, inv)| inv.last().copied()).max()
    }

    pub fn total_days(&self) -> Option<f64> {
        Some(days_between(&self.first()?, &self.last()?))
    }

    pub fn file_count(&self) -> usize {
        self.inventories().map(|(_, _, inv)| inv.file_count()).sum()
    }

    pub fn byte_total(&self) -> u64 {
        self.inventories().map(|(_, _, inv)| inv.byte_total()).sum()
    }

    pub fn device_count(&self) -> usize {
        distinct_devices(self.devices.iter())
    }

    pub fn phone_os(&self) -> PhoneOs {
        PhoneOs::from_records(self.devices.iter())
    }

    pub fn conflicts(&self) -> impl Iterator<Item = MergeConflict> + '_ {
        self.inventories().flat_map(move |(stream, survey, inv)| {
            inv.conflicts().map(move |(bucket, sizes)| MergeConflict {
                user_id: self.user_id.clone(),
                stream: stream.to_string(),
                survey: survey.map(str::to_string),
                bucket: *bucket,
                sizes: sizes.clone(),
            })
        })
    }

    /// Recompute passive stream coverage from `study`'s duty cycles. Without a study every
    /// stream's coverage is cleared.
    pub fn apply_coverage(&mut self, study: Option<&Study>) {
        for (stream, inventory) in self.passive.iter_mut() {
            inventory.set_duty_cycle(study.and_then(|s| s.duty_cycle(stream)));
        }
    }

    pub fn summary(&self, name: &str, label: impl Fn(&str) -> String) -> Summary {
        let overview = Summary::new()
            .text("User ID", &self.user_id)
            .maybe("First observation", self.first().map(|b| b.readable()))
            .maybe("Last observation", self.last().map(|b| b.readable()))
            .maybe("Total days", self.total_days())
            .text("Raw files", self.file_count())
            .text("Size (MB)", format!("{:.2}", self.byte_total() as f64 / 1e6));
        let device = Summary::new()
            .text("Devices", self.device_count())
            .text("Phone OS", self.phone_os())
            .list(
                "App versions",
                self.devices
                    .iter()
                    .filter_map(|d| d.beiwe_version.clone())
                    .collect::<BTreeSet<_>>(),
            );
        let passive = self.passive.iter().fold(Summary::new(), |acc, (stream, inv)| {
            let mut entry = Summary::new()
                .text("Files", inv.file_count())
                .maybe("First", inv.first().map(HourBucket::readable))
                .maybe("Last", inv.last().map(HourBucket::readable));
            if let Some(coverage) = inv.coverage() {
                entry = entry.text("Coverage", format!("{:.3}", coverage.fraction()));
            }
            acc.nested(stream.clone(), entry)
        });
        let surveys = self.surveys.iter().fold(Summary::new(), |acc, (stream, surveys)| {
            let per_survey = surveys.iter().fold(Summary::new(), |acc, (survey, inv)| {
                acc.text(label(survey), format!("{} files", inv.file_count()))
            });
            acc.nested(stream.clone(), per_survey)
        });
        let irregular = Summary::new()
            .list("Irregular directories", self.irregular_directories.iter())
            .text("Unregistered files", self.unregistered_files.len());
        Summary::with_header(name)
            .nested("Overview", overview)
            .nested("Device", device)
            .nested("Passive Data", passive)
            .nested("Survey Data", surveys)
            .nested("Anomalies", irregular)
    }
}

/// Scans user directories into [UserRegistry] values.
#[derive(Debug, Clone)]
pub struct UserRegistryBuilder<'a> {
    config: &'a ScanConfig,
}

impl<'a> UserRegistryBuilder<'a> {
    pub fn new(config: &'a ScanConfig) -> Self {
        UserRegistryBuilder { config }
    }

    /// Inventory `<root>/<user>`. Unknown subdirectories are recorded as irregular; files whose
    /// names are not hour buckets, or that sit outside the expected nesting, are unregistered.
    pub fn scan<P: AsRef<Path>>(&self, user_dir: P) -> Result<UserRegistry, RegistryError> {
        let user_dir = user_dir.as_ref();
        let user_id = user_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| RegistryError::NotFound(format!("{user_dir:?} has no user id")))?;
        tracing::debug!("Scanning {user_id} in {:?}", user_dir);
        let mut registry = UserRegistry::new(&user_id);
        registry.sources.insert(user_dir.to_path_buf());

        let mut entries = fs::read_dir(user_dir)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !entry.file_type()?.is_dir() {
                registry.unregistered_files.insert(path);
            } else if self.config.is_survey_stream(&name) {
                let surveys = self.scan_survey_stream(&path, &mut registry.unregistered_files)?;
                registry.surveys.insert(name, surveys);
            } else if self.config.is_known_stream(&name) {
                let inventory = self.scan_stream(&path, &mut registry.unregistered_files)?;
                registry.passive.insert(name, inventory);
            } else {
                tracing::warn!("Irregular directory for {user_id}: {name}");
                registry.irregular_directories.insert(name);
            }
        }

        if let Some(identifiers) = registry.passive.get(IDENTIFIERS_STREAM) {
            for (bucket, entry) in identifiers.buckets() {
                for path in entry.paths.iter() {
                    match DeviceRecord::read(path, *bucket) {
                        Ok(record) => {
                            registry.devices.insert(record);
                        }
                        Err(e) if e.is_document_error() => {
                            tracing::warn!("Skipping identifiers file {:?}: {e}", path);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        tracing::debug!(
            "Scanned {user_id}: {} files, {} irregular directories, {} unregistered files",
            registry.file_count(),
            registry.irregular_directories.len(),
            registry.unregistered_files.len()
        );
        Ok(registry)
    }

    fn scan_stream(
        &self,
        stream_dir: &Path,
        unregistered: &mut BTreeSet<PathBuf>,
    ) -> Result<StreamInventory, RegistryError> {
        let mut inventory = StreamInventory::default();
        for entry in WalkDir::new(stream_dir).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let bucket = match entry.depth() {
                1 => HourBucket::from_filename(&entry.file_name().to_string_lossy()),
                _ => None,
            };
            match bucket {
                Some(bucket) if !self.config.in_range(&bucket) => {}
                Some(bucket) => {
                    let size = entry.metadata()?.len();
                    inventory.record(bucket, size, entry.path());
                }
                None => {
                    unregistered.insert(entry.path().to_path_buf());
                }
            }
        }
        Ok(inventory)
    }

    fn scan_survey_stream(
        &self,
        stream_dir: &Path,
        unregistered: &mut BTreeSet<PathBuf>,
    ) -> Result<BTreeMap<String, StreamInventory>, RegistryError> {
        let mut surveys = BTreeMap::new();
        for entry in WalkDir::new(stream_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_dir() {
                let survey_id = entry.file_name().to_string_lossy().to_string();
                let inventory = self.scan_stream(entry.path(), unregistered)?;
                surveys.insert(survey_id, inventory);
            } else {
                unregistered.insert(entry.path().to_path_buf());
            }
        }
        Ok(surveys)
    }
}
