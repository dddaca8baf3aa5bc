//! Persisted project records.
//!
//! ```text
//! <Project_Name>/
//!     project.json                  roots, options, assignments, flags, configuration index
//!     registries/<user>.json        one reloadable UserRegistry per user
//!     overview.csv                  one row per user
//!     summary.txt
//!     users/<user>.txt
//!     configurations/<fingerprint>/ configuration records
//! ```

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use super::{
    flags::FlagSet,
    project::{ConfigurationAssignment, OverviewRow, ProjectRegistry, UserSelection},
    user::UserRegistry,
};
use crate::{
    config::RegistryConfig,
    error::RegistryError,
    study::{
        record::{read_json, write_json},
        Study,
    },
    time::local_now,
};

pub const PROJECT_FILE: &str = "project.json";
pub const REGISTRIES_DIR: &str = "registries";
pub const CONFIGURATIONS_DIR: &str = "configurations";
pub const USERS_DIR: &str = "users";
pub const OVERVIEW_FILE: &str = "overview.csv";
pub const SUMMARY_FILE: &str = "summary.txt";

pub const OVERVIEW_HEADER: [&str; 14] = [
    "user_id",
    "user_name",
    "first_observation",
    "last_observation",
    "total_days",
    "raw_file_count",
    "size_bytes",
    "n_devices",
    "os",
    "irregular_directories",
    "unregistered_files",
    "flags",
    "study_name",
    "configuration_file",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ConfigurationRecord {
    /// Path the configuration was attached from.
    source: PathBuf,
    /// Record directory under `configurations/`.
    directory: String,
    fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectRecord {
    name: String,
    created: String,
    roots: BTreeSet<PathBuf>,
    selection: UserSelection,
    config: RegistryConfig,
    users: BTreeSet<String>,
    assignment: ConfigurationAssignment,
    user_studies: BTreeMap<String, PathBuf>,
    configurations: Vec<ConfigurationRecord>,
    flags: FlagSet,
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn overview_csv(rows: &[OverviewRow]) -> Result<String, RegistryError> {
    let mut out = String::new();
    writeln!(out, "{}", OVERVIEW_HEADER.join(","))?;
    for row in rows {
        let fields = [
            row.user_id.clone(),
            row.user_name.clone(),
            row.first_observation.map(|b| b.to_string()).unwrap_or_default(),
            row.last_observation.map(|b| b.to_string()).unwrap_or_default(),
            row.total_days.map(|d| d.to_string()).unwrap_or_default(),
            row.raw_file_count.to_string(),
            row.size_bytes.to_string(),
            row.n_devices.to_string(),
            row.os.to_string(),
            row.irregular_directories.to_string(),
            row.unregistered_files.to_string(),
            row.flags.join(";"),
            row.study_name.clone().unwrap_or_default(),
            row.configuration_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(out)
}

impl ProjectRegistry {
    /// Write the project record under `destination`. Returns the record directory.
    pub fn export<P: AsRef<Path>>(&self, name: &str, destination: P) -> Result<PathBuf, RegistryError> {
        let out_dir = destination.as_ref().join(name.replace(' ', "_"));
        let registries = out_dir.join(REGISTRIES_DIR);
        let users_dir = out_dir.join(USERS_DIR);
        let configurations_dir = out_dir.join(CONFIGURATIONS_DIR);
        fs::create_dir_all(&registries)?;
        fs::create_dir_all(&users_dir)?;
        fs::create_dir_all(&configurations_dir)?;
        let layout = self.config.export.layout();

        let mut configurations = Vec::new();
        let mut used = BTreeSet::new();
        for (source, study) in self.studies.iter() {
            let fingerprint = study.fingerprint();
            let mut directory = fingerprint.clone();
            let mut n = 1;
            while used.contains(&directory) {
                n += 1;
                directory = format!("{fingerprint}_{n}");
            }
            used.insert(directory.clone());
            study.export_to(&configurations_dir.join(&directory), &layout)?;
            configurations.push(ConfigurationRecord {
                source: source.clone(),
                directory,
                fingerprint,
            });
        }

        for (user_id, user) in self.users.iter() {
            write_json(user, &registries.join(format!("{user_id}.json")))?;
            if let Some(summary) = self.user_summary(user_id) {
                summary.to_file(users_dir.join(format!("{user_id}.txt")), &layout)?;
            }
        }
        fs::write(out_dir.join(OVERVIEW_FILE), overview_csv(&self.overview_rows())?)?;
        self.summary(name).to_file(out_dir.join(SUMMARY_FILE), &layout)?;

        let record = ProjectRecord {
            name: name.to_string(),
            created: local_now(),
            roots: self.roots.clone(),
            selection: self.selection.clone(),
            config: self.config.clone(),
            users: self.users.keys().cloned().collect(),
            assignment: self.assignment.clone(),
            user_studies: self.user_studies.clone(),
            configurations,
            flags: self.flags.clone(),
        };
        write_json(&record, &out_dir.join(PROJECT_FILE))?;
        tracing::info!("Exported project record {name} to {:?}", out_dir);
        Ok(out_dir)
    }

    /// Reconstruct a registry from a directory written by [ProjectRegistry::export]. Raw roots
    /// are not rescanned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ProjectRegistry, RegistryError> {
        let path = path.as_ref();
        let record: ProjectRecord = serde_json::from_value(read_json(&path.join(PROJECT_FILE))?)?;

        let mut users = BTreeMap::new();
        for user_id in record.users.iter() {
            let file = path.join(REGISTRIES_DIR).join(format!("{user_id}.json"));
            let user: UserRegistry = serde_json::from_value(read_json(&file)?)?;
            if &user.user_id != user_id {
                return Err(RegistryError::malformed(
                    file.display().to_string(),
                    format!("registry belongs to {}", user.user_id),
                ));
            }
            users.insert(user_id.clone(), user);
        }

        let mut studies = BTreeMap::new();
        for configuration in record.configurations.iter() {
            let directory = path.join(CONFIGURATIONS_DIR).join(&configuration.directory);
            let study = Study::load(&directory, None)?;
            if study.fingerprint() != configuration.fingerprint {
                tracing::warn!(
                    "Configuration record {:?} does not match its recorded fingerprint",
                    directory
                );
            }
            studies.insert(configuration.source.clone(), study);
        }

        let mut project = ProjectRegistry {
            roots: record.roots,
            selection: record.selection,
            config: record.config,
            users,
            assignment: record.assignment,
            studies,
            user_studies: record.user_studies,
            flags: record.flags,
            named: true,
        };
        project.named = project.pool_is_uniquely_named();
        tracing::info!("Loaded project record {} from {:?}", record.name, path);
        Ok(project)
    }
}
