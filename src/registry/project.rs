use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use super::{
    device::PhoneOs,
    flags::{Flag, FlagSet},
    user::{MergeConflict, UserRegistry, UserRegistryBuilder},
};
use crate::{
    config::{CoveragePolicy, RegistryConfig},
    error::RegistryError,
    study::Study,
    summary::Summary,
    time::{local_now, HourBucket},
};

/// Which user directories to build registries for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSelection {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl UserSelection {
    pub fn only<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UserSelection::Only(users.into_iter().map(Into::into).collect())
    }
}

/// Configuration documents to attach to users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationAssignment {
    #[default]
    None,
    /// One configuration for every user.
    All(PathBuf),
    PerUser(BTreeMap<String, PathBuf>),
}

impl ConfigurationAssignment {
    fn paths(&self) -> BTreeSet<PathBuf> {
        match self {
            ConfigurationAssignment::None => BTreeSet::new(),
            ConfigurationAssignment::All(path) => BTreeSet::from([path.clone()]),
            ConfigurationAssignment::PerUser(map) => map.values().cloned().collect(),
        }
    }

    fn path_for(&self, user_id: &str) -> Option<&PathBuf> {
        match self {
            ConfigurationAssignment::None => None,
            ConfigurationAssignment::All(path) => Some(path),
            ConfigurationAssignment::PerUser(map) => map.get(user_id),
        }
    }
}

/// One row of the project overview table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewRow {
    pub user_id: String,
    pub user_name: String,
    pub first_observation: Option<HourBucket>,
    pub last_observation: Option<HourBucket>,
    pub total_days: Option<f64>,
    pub raw_file_count: usize,
    pub size_bytes: u64,
    pub n_devices: usize,
    pub os: PhoneOs,
    pub irregular_directories: usize,
    pub unregistered_files: usize,
    pub flags: Vec<String>,
    pub study_name: Option<String>,
    pub configuration_file: Option<PathBuf>,
}

/// Aggregate facts over every user of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectOverview {
    pub first: Option<HourBucket>,
    pub last: Option<HourBucket>,
    pub users: usize,
    pub ios_users: usize,
    pub android_users: usize,
    pub devices: usize,
    /// Stream name -> (files, bytes).
    pub streams: BTreeMap<String, (usize, u64)>,
}

/// Raw-data inventory of a whole project, with attached study configurations.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    pub(crate) roots: BTreeSet<PathBuf>,
    pub(crate) selection: UserSelection,
    pub(crate) config: RegistryConfig,
    pub(crate) users: BTreeMap<String, UserRegistry>,
    pub(crate) assignment: ConfigurationAssignment,
    /// Attached studies keyed by configuration path.
    pub(crate) studies: BTreeMap<PathBuf, Study>,
    pub(crate) user_studies: BTreeMap<String, PathBuf>,
    pub(crate) flags: FlagSet,
    /// False when attached studies could not be given unique names.
    pub(crate) named: bool,
}

impl PartialEq for ProjectRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.users == other.users
            && self.studies == other.studies
            && self.user_studies == other.user_studies
            && self.flags == other.flags
    }
}

/// Names of the user directories under a raw root.
fn user_directories(root: &Path) -> Result<BTreeSet<String>, RegistryError> {
    let mut users = BTreeSet::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            users.insert(entry.file_name().to_string_lossy().to_string());
        }
    }
    Ok(users)
}

impl ProjectRegistry {
    /// Scan `roots`, merge users split across roots, and attach configurations.
    pub fn create<I, P>(
        roots: I,
        selection: UserSelection,
        assignment: ConfigurationAssignment,
        config: RegistryConfig,
    ) -> Result<ProjectRegistry, RegistryError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        ProjectRegistry::create_with_abort(roots, selection, assignment, config, || false)
    }

    /// As [ProjectRegistry::create], polling `should_abort` before each user. An abort fails
    /// with [RegistryError::OperationCancelled]; no partial registry is returned.
    pub fn create_with_abort<I, P, F>(
        roots: I,
        selection: UserSelection,
        assignment: ConfigurationAssignment,
        config: RegistryConfig,
        mut should_abort: F,
    ) -> Result<ProjectRegistry, RegistryError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
        F: FnMut() -> bool,
    {
        let roots: BTreeSet<PathBuf> = roots
            .into_iter()
            .map(|root| root.as_ref().to_path_buf())
            .collect();
        let mut available = BTreeMap::<String, Vec<&PathBuf>>::new();
        for root in roots.iter() {
            for user in user_directories(root)? {
                available.entry(user).or_default().push(root);
            }
        }
        let selected: BTreeSet<String> = match &selection {
            UserSelection::All => available.keys().cloned().collect(),
            UserSelection::Only(users) => users.clone(),
        };

        let mut flags = FlagSet::default();
        for user in available.keys().filter(|u| !selected.contains(*u)) {
            flags.insert(Flag::IgnoredUsers, user);
        }
        for user in selected.iter().filter(|u| !available.contains_key(*u)) {
            flags.insert(Flag::NoRegistry, user);
        }

        let builder = UserRegistryBuilder::new(&config.scan);
        let mut users = BTreeMap::new();
        for user_id in selected.iter() {
            let Some(user_roots) = available.get(user_id) else {
                continue;
            };
            if should_abort() {
                tracing::warn!("Project scan cancelled before {user_id}");
                return Err(RegistryError::OperationCancelled);
            }
            let mut merged = UserRegistry::new(user_id);
            for root in user_roots {
                merged.merge(builder.scan(root.join(user_id))?)?;
            }
            users.insert(user_id.clone(), merged);
        }

        let mut project = ProjectRegistry {
            roots,
            selection,
            config,
            users,
            assignment: ConfigurationAssignment::None,
            studies: BTreeMap::new(),
            user_studies: BTreeMap::new(),
            flags,
            named: true,
        };
        project.update_configurations(assignment)?;
        tracing::info!(
            "Created registry for {} users from {} roots",
            project.users.len(),
            project.roots.len()
        );
        Ok(project)
    }

    /// Attach configurations and re-derive coverage, names and flags.
    ///
    /// Each distinct path is normalized once; a path already attached keeps its Study, including
    /// any renamed objects. On failure the registry is unchanged.
    pub fn update_configurations(
        &mut self,
        assignment: ConfigurationAssignment,
    ) -> Result<(), RegistryError> {
        let mut studies = BTreeMap::new();
        for path in assignment.paths() {
            let study = match self.studies.get(&path) {
                Some(study) => study.clone(),
                None => Study::load(&path, None)?,
            };
            studies.insert(path, study);
        }
        let mut user_studies = BTreeMap::new();
        for user_id in self.users.keys() {
            if let Some(path) = assignment.path_for(user_id) {
                user_studies.insert(user_id.clone(), path.clone());
            }
        }
        if let ConfigurationAssignment::PerUser(map) = &assignment {
            for user_id in map.keys().filter(|u| !self.users.contains_key(*u)) {
                tracing::warn!("Configuration assigned to unknown user {user_id}");
            }
        }
        self.studies = studies;
        self.user_studies = user_studies;
        self.assignment = assignment;
        self.refresh();
        Ok(())
    }

    /// Rename objects of the study attached from `path`. Keys are current names.
    pub fn update_names(
        &mut self,
        path: &Path,
        renames: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        let study = self
            .studies
            .get_mut(path)
            .ok_or_else(|| RegistryError::NotFound(format!("no configuration attached from {path:?}")))?;
        study.update_names(renames)?;
        self.refresh();
        Ok(())
    }

    /// True if every identifier across the attached studies has one name and every name one
    /// identifier.
    pub(crate) fn pool_is_uniquely_named(&self) -> bool {
        let mut by_id = BTreeMap::<&str, BTreeSet<&str>>::new();
        let mut by_name = BTreeMap::<&str, BTreeSet<&str>>::new();
        for study in self.studies.values() {
            for (id, name) in study.names().iter() {
                by_id.entry(id).or_default().insert(name);
                by_name.entry(name).or_default().insert(id);
            }
        }
        by_id.values().all(|names| names.len() == 1) && by_name.values().all(|ids| ids.len() == 1)
    }

    /// Recompute coverage, naming and per-user flags from current state.
    fn refresh(&mut self) {
        let fallback = match self.config.coverage.policy {
            CoveragePolicy::AttachedOnly => None,
            CoveragePolicy::AnyAttached => self.studies.values().next(),
        };
        for (user_id, user) in self.users.iter_mut() {
            let own = self
                .user_studies
                .get(user_id)
                .and_then(|path| self.studies.get(path));
            user.apply_coverage(own.or(fallback));
        }

        self.named = self.pool_is_uniquely_named();
        if !self.named {
            tracing::warn!(
                "Attached configurations share names; objects are labeled by identifier"
            );
        }

        let mut flags = FlagSet::default();
        for (flag, users) in self.flags.iter() {
            if matches!(flag, Flag::IgnoredUsers | Flag::NoRegistry) {
                for user in users {
                    flags.insert(flag, user);
                }
            }
        }
        for (user_id, user) in self.users.iter() {
            for flag in Flag::of_user(user) {
                flags.insert(flag, user_id);
            }
            if !self.named && self.user_studies.contains_key(user_id) {
                flags.insert(Flag::UnnamedObjects, user_id);
            }
        }
        self.flags = flags;
    }

    pub fn roots(&self) -> &BTreeSet<PathBuf> {
        &self.roots
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn selection(&self) -> &UserSelection {
        &self.selection
    }

    pub fn assignment(&self) -> &ConfigurationAssignment {
        &self.assignment
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn users(&self) -> &BTreeMap<String, UserRegistry> {
        &self.users
    }

    pub fn user(&self, user_id: &str) -> Option<&UserRegistry> {
        self.users.get(user_id)
    }

    pub fn studies(&self) -> &BTreeMap<PathBuf, Study> {
        &self.studies
    }

    pub fn study_for(&self, user_id: &str) -> Option<&Study> {
        self.user_studies
            .get(user_id)
            .and_then(|path| self.studies.get(path))
    }

    pub fn configuration_path(&self, user_id: &str) -> Option<&PathBuf> {
        self.user_studies.get(user_id)
    }

    /// Display label of a study, survey or question: its assigned name when the attached pool
    /// is uniquely named, otherwise the identifier.
    pub fn object_label(&self, identifier: &str) -> String {
        if self.named {
            if let Some(name) = self.studies.values().find_map(|s| s.names().name(identifier)) {
                return name.to_string();
            }
        }
        identifier.to_string()
    }

    /// User ids ordered by first observation, users without data last, ties by id.
    pub fn ordered_user_ids(&self) -> Vec<&str> {
        let mut ids: Vec<(&str, Option<HourBucket>)> = self
            .users
            .iter()
            .map(|(id, user)| (id.as_str(), user.first()))
            .collect();
        ids.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => x.cmp(&y).then(a.0.cmp(b.0)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(b.0),
        });
        ids.into_iter().map(|(id, _)| id).collect()
    }

    /// Default display names, `Participant <n>` in order of first observation.
    pub fn user_names(&self) -> BTreeMap<String, String> {
        self.ordered_user_ids()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), format!("Participant {}", i + 1)))
            .collect()
    }

    /// Every merge conflict across users, in user, stream, survey, bucket order.
    pub fn merge_conflicts(&self) -> Vec<MergeConflict> {
        let mut conflicts: Vec<MergeConflict> =
            self.users.values().flat_map(|u| u.conflicts()).collect();
        conflicts.sort();
        conflicts
    }

    pub fn overview_rows(&self) -> Vec<OverviewRow> {
        let names = self.user_names();
        self.ordered_user_ids()
            .into_iter()
            .filter_map(|id| self.users.get(id))
            .map(|user| OverviewRow {
                user_id: user.user_id.clone(),
                user_name: names.get(&user.user_id).cloned().unwrap_or_default(),
                first_observation: user.first(),
                last_observation: user.last(),
                total_days: user.total_days(),
                raw_file_count: user.file_count(),
                size_bytes: user.byte_total(),
                n_devices: user.device_count(),
                os: user.phone_os(),
                irregular_directories: user.irregular_directories.len(),
                unregistered_files: user.unregistered_files.len(),
                flags: self
                    .flags
                    .of(&user.user_id)
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
                study_name: self
                    .study_for(&user.user_id)
                    .map(|s| self.object_label(s.identifier())),
                configuration_file: self.configuration_path(&user.user_id).cloned(),
            })
            .collect()
    }

    pub fn overview(&self) -> ProjectOverview {
        let mut overview = ProjectOverview {
            users: self.users.len(),
            ..Default::default()
        };
        for user in self.users.values() {
            overview.first = match (overview.first, user.first()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            overview.last = match (overview.last, user.last()) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            match user.phone_os() {
                PhoneOs::Ios => overview.ios_users += 1,
                PhoneOs::Android => overview.android_users += 1,
                PhoneOs::Multiple | PhoneOs::Unknown => {}
            }
            overview.devices += user.device_count();
            for (stream, _, inventory) in user.inventories() {
                let totals = overview.streams.entry(stream.to_string()).or_default();
                totals.0 += inventory.file_count();
                totals.1 += inventory.byte_total();
            }
        }
        overview
    }

    pub fn summary(&self, name: &str) -> Summary {
        let overview = self.overview();
        let details = Summary::new()
            .text("Created", local_now())
            .list("Raw data directories", self.roots.iter().map(|r| r.display()))
            .text("Users", overview.users)
            .text("iOS users", overview.ios_users)
            .text("Android users", overview.android_users)
            .text("Devices", overview.devices)
            .maybe("First observation", overview.first.map(|b| b.readable()))
            .maybe("Last observation", overview.last.map(|b| b.readable()));
        let streams = overview
            .streams
            .iter()
            .fold(Summary::new(), |acc, (stream, (files, bytes))| {
                acc.text(
                    stream.clone(),
                    format!("{files} files, {:.2} MB", *bytes as f64 / 1e6),
                )
            });
        let configurations = self.studies.iter().fold(Summary::new(), |acc, (path, study)| {
            acc.text(self.object_label(study.identifier()), path.display())
        });
        let flags = self.flags.iter().fold(Summary::new(), |acc, (flag, users)| {
            acc.list(flag.to_string(), users.iter())
        });
        let conflicts = self.merge_conflicts();
        let mut summary = Summary::with_header(name)
            .nested("Overview", details)
            .nested("Streams", streams)
            .nested("Configurations", configurations)
            .nested("Flags", flags);
        if !conflicts.is_empty() {
            let listed = conflicts.iter().fold(Summary::new(), |acc, c| {
                let location = match &c.survey {
                    Some(survey) => format!("{}/{}/{}", c.user_id, c.stream, survey),
                    None => format!("{}/{}", c.user_id, c.stream),
                };
                acc.list(format!("{location} {}", c.bucket), c.sizes.iter())
            });
            summary = summary.nested("Merge conflicts", listed);
        }
        summary
    }

    pub fn user_summary(&self, user_id: &str) -> Option<Summary> {
        let user = self.users.get(user_id)?;
        let names = self.user_names();
        let name = names.get(user_id).cloned().unwrap_or_else(|| user_id.to_string());
        Some(user.summary(&name, |id| self.object_label(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{other_study_document, write_document, write_identifiers, write_stream_file};
    use test_log::test;

    #[test]
    fn test_selection_flags_and_participant_names() {
        let root = tempfile::tempdir().unwrap();
        write_stream_file(&root.path().join("late"), "gps", "2020-03-05 10_00_00.csv", 10);
        write_identifiers(&root.path().join("late"), "2020-03-05 09_00_00.csv", "D1", "iOS");
        write_stream_file(&root.path().join("early"), "gps", "2020-03-01 10_00_00.csv", 10);
        write_stream_file(&root.path().join("skipped"), "gps", "2020-03-01 10_00_00.csv", 10);

        let project = ProjectRegistry::create(
            [root.path()],
            UserSelection::only(["late", "early", "missing"]),
            ConfigurationAssignment::None,
            RegistryConfig::default(),
        )
        .unwrap();
        assert_eq!(project.users().len(), 2);
        assert!(project.flags().is_flagged(Flag::IgnoredUsers, "skipped"));
        assert!(project.flags().is_flagged(Flag::NoRegistry, "missing"));
        assert!(project.flags().is_flagged(Flag::NoIdentifiers, "early"));
        assert!(project.flags().is_flagged(Flag::UnknownOs, "early"));
        assert!(!project.flags().is_flagged(Flag::UnknownOs, "late"));
        let names = project.user_names();
        assert_eq!(names["early"], "Participant 1");
        assert_eq!(names["late"], "Participant 2");
    }

    #[test]
    fn test_abort_fails_whole_scan() {
        let root = tempfile::tempdir().unwrap();
        write_stream_file(&root.path().join("u1"), "gps", "2020-03-01 10_00_00.csv", 10);
        write_stream_file(&root.path().join("u2"), "gps", "2020-03-01 10_00_00.csv", 10);
        let mut calls = 0;
        let result = ProjectRegistry::create_with_abort(
            [root.path()],
            UserSelection::All,
            ConfigurationAssignment::None,
            RegistryConfig::default(),
            || {
                calls += 1;
                calls > 1
            },
        );
        assert_eq!(result.unwrap_err(), RegistryError::OperationCancelled);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let result = ProjectRegistry::create(
            [root.path().join("absent")],
            UserSelection::All,
            ConfigurationAssignment::None,
            RegistryConfig::default(),
        );
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_single_configuration_is_labeled_by_name() {
        let root = tempfile::tempdir().unwrap();
        write_stream_file(&root.path().join("raw").join("u1"), "gps", "2020-03-01 10_00_00.csv", 10);
        let path = write_document(root.path(), "Weekly_surveys_and_settings.json", &other_study_document());
        let project = ProjectRegistry::create(
            [root.path().join("raw")],
            UserSelection::All,
            ConfigurationAssignment::All(path.clone()),
            RegistryConfig::default(),
        )
        .unwrap();
        assert_eq!(project.object_label("60a1b2c3d4e5f60718293a4c"), "Survey 1");
        assert_eq!(project.object_label("60a1b2c3d4e5f60718293a4b"), "Weekly");
        assert_eq!(project.object_label("not-an-object"), "not-an-object");
        assert!(!project.flags().contains(Flag::UnnamedObjects));
        assert_eq!(project.study_for("u1").map(Study::identifier), Some("60a1b2c3d4e5f60718293a4b"));
        // gps is disabled in this study.
        assert_eq!(project.user("u1").unwrap().passive["gps"].coverage(), None);
    }
}
