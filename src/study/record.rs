//! Persisted configuration records.
//!
//! Layout of an exported study:
//!
//! ```text
//! <Study_Name>/
//!     records/raw.json       pretty-printed source document
//!     records/names.json     identifier -> name
//!     records/paths.json     files the study was read from
//!     overview.txt
//!     warnings.txt
//!     settings/*.txt
//!     audio_surveys/, tracking_surveys/, other_surveys/
//! ```

use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{normalize::normalize_named, Category, NameRegistry, Study, StudyPaths};
use crate::{error::RegistryError, summary::Layout};

pub const RECORDS_DIR: &str = "records";
pub const RAW_FILE: &str = "raw.json";
pub const NAMES_FILE: &str = "names.json";
pub const PATHS_FILE: &str = "paths.json";

/// Study name implied by a configuration file name, e.g.
/// `Sleep_Study_surveys_and_settings.json` -> `Sleep Study`.
pub fn study_name_from_path(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = file_name
        .replace("_surveys_and_settings", "")
        .replace(".json", "")
        .replace('_', " ");
    if name.trim().is_empty() {
        super::DEFAULT_STUDY_NAME.to_string()
    } else {
        name
    }
}

pub(crate) fn read_json(path: &Path) -> Result<Value, RegistryError> {
    tracing::debug!("Reading {:?}", path);
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub(crate) fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<(), RegistryError> {
    tracing::debug!("Writing {:?}", path);
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// File or directory name for a user-assigned object name. Never a path separator or a
/// relative component.
fn file_label(name: &str) -> String {
    let label: String = name
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if label.chars().all(|c| c == '.') {
        "_".repeat(label.len().max(1))
    } else {
        label
    }
}

impl Study {
    /// Load a configuration document, or a directory written by [Study::export].
    ///
    /// `names_path` optionally points to a names file to apply; it is ignored for record
    /// directories, which carry their own.
    pub fn load<P: AsRef<Path>>(path: P, names_path: Option<&Path>) -> Result<Study, RegistryError> {
        let path = path.as_ref();
        let (doc_path, names_path, study_name) = if path.is_dir() {
            let records = path.join(RECORDS_DIR);
            let doc_path = records.join(RAW_FILE);
            let study_name = path
                .file_name()
                .map(|n| n.to_string_lossy().replace('_', " "))
                .unwrap_or_else(|| super::DEFAULT_STUDY_NAME.to_string());
            (doc_path, Some(records.join(NAMES_FILE)), study_name)
        } else {
            (
                path.to_path_buf(),
                names_path.map(Path::to_path_buf),
                study_name_from_path(path),
            )
        };
        let (mut study, _) = normalize_named(read_json(&doc_path)?, &study_name)?;
        if let Some(names_path) = &names_path {
            let persisted: NameRegistry = serde_json::from_value(read_json(names_path)?)?;
            study.load_names(&persisted)?;
        }
        study.set_paths(StudyPaths {
            path: Some(doc_path),
            names_path,
        });
        Ok(study)
    }

    /// Write the configuration record and its text documentation under `directory`. Returns the
    /// record directory.
    pub fn export<P: AsRef<Path>>(
        &self,
        directory: P,
        layout: &Layout,
    ) -> Result<PathBuf, RegistryError> {
        let out_dir = directory.as_ref().join(file_label(&self.name()));
        self.export_to(&out_dir, layout)?;
        Ok(out_dir)
    }

    pub(crate) fn export_to(&self, out_dir: &Path, layout: &Layout) -> Result<(), RegistryError> {
        let records = out_dir.join(RECORDS_DIR);
        let settings_dir = out_dir.join("settings");
        fs::create_dir_all(&records)?;
        fs::create_dir_all(&settings_dir)?;

        write_json(&self.raw, &records.join(RAW_FILE))?;
        write_json(&self.names, &records.join(NAMES_FILE))?;
        write_json(&self.paths, &records.join(PATHS_FILE))?;

        self.summary().to_file(out_dir.join("overview.txt"), layout)?;
        let mut warnings = String::from("Warnings:\n");
        if self.warnings.is_empty() {
            warnings.push_str("None\n");
        }
        for warning in self.warnings.iter() {
            warnings.push_str(&format!("{warning}\n"));
        }
        fs::write(out_dir.join("warnings.txt"), warnings)?;

        self.settings_summary(&[
            Category::Record,
            Category::Survey,
            Category::App,
            Category::Unclassified,
        ])
        .to_file(settings_dir.join("general_settings.txt"), layout)?;
        self.settings_summary(&[Category::Passive])
            .to_file(settings_dir.join("passive_data_settings.txt"), layout)?;
        self.settings_summary(&[Category::Display])
            .to_file(settings_dir.join("display_settings.txt"), layout)?;

        for survey in self.surveys.iter() {
            let survey_dir = out_dir.join(survey.kind.folder());
            fs::create_dir_all(&survey_dir)?;
            let mut name = file_label(&self.names.label(&survey.identifier));
            if survey.is_deleted() {
                name = format!("deleted_{name}");
            }
            survey
                .summary(&self.names)
                .to_file(survey_dir.join(format!("{name}.txt")), layout)?;
        }
        tracing::info!("Exported configuration record to {:?}", out_dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{current_v1_document, write_document};
    use std::collections::BTreeMap;
    use test_log::test;

    #[test]
    fn test_study_name_from_file_name() {
        assert_eq!(
            study_name_from_path(Path::new("/x/Sleep_Study_surveys_and_settings.json")),
            "Sleep Study"
        );
        assert_eq!(study_name_from_path(Path::new("/x/.json")), "Study");
    }

    #[test]
    fn test_file_labels_stay_inside_directory() {
        assert_eq!(file_label("Sleep Study"), "Sleep_Study");
        assert_eq!(file_label("../../etc"), ".._.._etc");
        assert_eq!(file_label(".."), "__");
        assert_eq!(file_label(""), "_");
        assert_eq!(Path::new(&file_label("a/b\\c")).components().count(), 1);
    }

    #[test]
    fn test_renamed_export_is_confined_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path(), "Mood_surveys_and_settings.json", &current_v1_document());
        let mut study = Study::load(&path, None).unwrap();
        let renames = BTreeMap::from([
            ("Mood".to_string(), "../escaped".to_string()),
            ("Survey 2".to_string(), "a/b".to_string()),
        ]);
        study.update_names(&renames).unwrap();
        let out_root = dir.path().join("out");
        let out = study.export(&out_root, &Layout::default()).unwrap();
        assert_eq!(out.parent(), Some(out_root.as_path()));
        assert!(out.join("tracking_surveys").join("a_b.txt").exists());
        assert!(!dir.path().join("escaped").exists());
    }

    #[test]
    fn test_export_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path(), "Mood_surveys_and_settings.json", &current_v1_document());
        let mut study = Study::load(&path, None).unwrap();
        assert_eq!(study.name(), "Mood");

        let renames = BTreeMap::from([("Survey 1".to_string(), "Voice Diary".to_string())]);
        study.update_names(&renames).unwrap();

        let out = study.export(dir.path().join("out"), &Layout::default()).unwrap();
        assert!(out.join("records").join("raw.json").exists());
        assert!(out.join("settings").join("passive_data_settings.txt").exists());
        assert!(out.join("audio_surveys").join("Voice_Diary.txt").exists());
        assert!(out.join("other_surveys").join("deleted_Survey_3.txt").exists());

        let reloaded = Study::load(&out, None).unwrap();
        assert_eq!(reloaded, study);
        assert_eq!(reloaded.names(), study.names());
        assert_eq!(reloaded.fingerprint(), study.fingerprint());
    }
}
