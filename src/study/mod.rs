//! Canonical model of a study configuration.
//!
//! A configuration document may use any [FormatVariant]. [normalize] detects the format, resolves
//! every attribute of the [schema::CATALOG], and builds a [Study] whose surveys and questions are
//! keyed by stable identifiers. Human readable names live in a separate [NameRegistry].
//!
//! Two studies compare equal when their canonical projections match, so the same configuration
//! stored in two formats, or re-exported, compares equal to its origin.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    path::PathBuf,
};

use crate::{error::RegistryError, summary::Summary};

pub mod format;
pub mod names;
pub mod normalize;
pub mod question;
pub mod record;
pub mod schema;
pub mod survey;

pub use format::{detect, FormatVariant};
pub use names::NameRegistry;
pub use normalize::normalize;
pub use question::{Question, QuestionKind};
pub use schema::{Category, Setting, SettingValue};
pub use survey::{DeliverySchedule, Survey, SurveyKind};

use schema::{CATALOG, DUTY_CYCLE_STREAMS};

static NOT_FOUND: SettingValue = SettingValue::NotFound;

/// Display name given to a study when no file name is available.
pub const DEFAULT_STUDY_NAME: &str = "Study";

/// Non-fatal findings recorded while normalizing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    UnknownSetting { key: String },
    UnknownSurveyType { survey: String, survey_type: String },
    UnknownSurveySetting { survey: String, key: String },
    UnknownQuestionType { question: String, question_type: String },
    UnknownDocumentKey { key: String },
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Warning::UnknownSetting { key } => write!(f, "unknown device setting: {key}"),
            Warning::UnknownSurveyType { survey_type, .. } => {
                write!(f, "unknown survey type: {survey_type}")
            }
            Warning::UnknownSurveySetting { survey, key } => {
                write!(f, "unknown survey setting: {key} (survey {survey})")
            }
            Warning::UnknownQuestionType { question_type, .. } => {
                write!(f, "unknown question type: {question_type}")
            }
            Warning::UnknownDocumentKey { key } => write!(f, "unknown document key: {key}"),
        }
    }
}

/// Files a study was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPaths {
    pub path: Option<PathBuf>,
    pub names_path: Option<PathBuf>,
}

/// Sampling period of a passive stream: one full on+off cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    pub cycle_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct Study {
    identifier: String,
    format: FormatVariant,
    settings: Vec<Setting>,
    surveys: Vec<Survey>,
    warnings: Vec<Warning>,
    names: NameRegistry,
    raw: Value,
    paths: StudyPaths,
}

impl Study {
    pub(crate) fn new(
        identifier: String,
        format: FormatVariant,
        settings: Vec<Setting>,
        surveys: Vec<Survey>,
        warnings: Vec<Warning>,
        names: NameRegistry,
        raw: Value,
    ) -> Study {
        Study {
            identifier,
            format,
            settings,
            surveys,
            warnings,
            names,
            raw,
            paths: StudyPaths::default(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn format(&self) -> FormatVariant {
        self.format
    }

    pub fn name(&self) -> String {
        self.names.label(&self.identifier)
    }

    pub fn names(&self) -> &NameRegistry {
        &self.names
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn paths(&self) -> &StudyPaths {
        &self.paths
    }

    pub(crate) fn set_paths(&mut self, paths: StudyPaths) {
        self.paths = paths;
    }

    pub fn surveys(&self) -> &[Survey] {
        &self.surveys
    }

    pub fn survey(&self, identifier: &str) -> Option<&Survey> {
        self.surveys.iter().find(|s| s.identifier == identifier)
    }

    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    pub fn settings_in(&self, category: Category) -> impl Iterator<Item = &Setting> {
        self.settings.iter().filter(move |s| s.category == category)
    }

    /// Resolved value of a device setting. Unknown names resolve to [SettingValue::NotFound].
    pub fn setting(&self, name: &str) -> &SettingValue {
        self.settings
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.value)
            .unwrap_or(&NOT_FOUND)
    }

    /// Every identifier this study defines: the study, its surveys and their questions.
    pub fn object_identifiers(&self) -> impl Iterator<Item = &str> {
        self.names.identifiers()
    }

    pub fn update_names(&mut self, renames: &BTreeMap<String, String>) -> Result<(), RegistryError> {
        self.names.update(renames)
    }

    pub fn load_names(&mut self, persisted: &NameRegistry) -> Result<(), RegistryError> {
        self.names.load(persisted)
    }

    /// SHA-256 of the compact source document, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.raw.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Sampling pattern of `stream`, if the study enables it and documents one.
    pub fn duty_cycle(&self, stream: &str) -> Option<DutyCycle> {
        if self.setting(stream).as_bool() == Some(false) {
            return None;
        }
        let seconds = |key: String| self.setting(&key).as_i64().filter(|s| *s >= 0);
        let cycle_seconds = match stream {
            "bluetooth" => {
                let on = seconds("bluetooth_on_duration_seconds".into())?;
                let total = seconds("bluetooth_total_duration_seconds".into())?;
                (on <= total).then_some(total)?
            }
            "wifi" => seconds("wifi_log_frequency_seconds".into())?,
            s if DUTY_CYCLE_STREAMS.contains(&s) => {
                let on = seconds(format!("{s}_on_duration_seconds"))?;
                let off = seconds(format!("{s}_off_duration_seconds"))?;
                on.checked_add(off)?
            }
            _ => return None,
        };
        (cycle_seconds > 0).then_some(DutyCycle { cycle_seconds })
    }

    /// Settings compared for equality with a study in `other` format: attributes both formats
    /// define, outside the record-keeping category.
    fn projection(&self, other: FormatVariant) -> Vec<(&str, &SettingValue)> {
        let compared = Category::compared();
        let mut projection: Vec<(&str, &SettingValue)> = CATALOG
            .iter()
            .filter(|attr| compared.contains(attr.category))
            .filter(|attr| attr.formats().contains(self.format) && attr.formats().contains(other))
            .map(|attr| (attr.name, self.setting(attr.name)))
            .collect();
        let mut unclassified: Vec<(&str, &SettingValue)> = self
            .settings_in(Category::Unclassified)
            .map(|s| (s.name.as_str(), &s.value))
            .collect();
        unclassified.sort_by(|a, b| a.0.cmp(b.0));
        projection.extend(unclassified);
        projection
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        self.surveys
            .iter()
            .fold((0, 0, 0), |(a, t, o), s| match s.kind {
                SurveyKind::Audio { .. } => (a + 1, t, o),
                SurveyKind::Tracking { .. } => (a, t + 1, o),
                SurveyKind::Generic { .. } => (a, t, o + 1),
            })
    }

    pub fn summary(&self) -> Summary {
        let (audio, tracking, other) = self.counts();
        let details = Summary::new()
            .text("Identifier", &self.identifier)
            .text("Format", self.format)
            .text("Default names", self.names.is_default())
            .text("Fingerprint", self.fingerprint());
        let counts = Summary::new()
            .text("Audio Surveys", audio)
            .text("Tracking Surveys", tracking)
            .text("Other Surveys", other);
        Summary::new()
            .nested(self.name(), details)
            .nested("Number of Surveys", counts)
    }

    pub fn settings_summary(&self, categories: &[Category]) -> Summary {
        categories.iter().fold(Summary::new(), |acc, category| {
            let group = self
                .settings_in(*category)
                .fold(Summary::new(), |g, s| g.text(s.name.clone(), &s.value));
            if group.is_empty() {
                acc.text(category.label(), "None")
            } else {
                acc.nested(category.label(), group)
            }
        })
    }
}

impl PartialEq for Study {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.projection(other.format) == other.projection(self.format)
            && self.surveys == other.surveys
    }
}

/// Identifier of the study in a document's resolved settings.
pub(crate) fn study_identifier(settings: &[Setting]) -> Result<String, RegistryError> {
    let value = settings
        .iter()
        .find(|s| s.name == schema::STUDY_ID)
        .and_then(|s| s.value.value());
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(RegistryError::malformed(
            "device_settings",
            "missing study identifier",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{current_v1_document, legacy_document};
    use serde_json::json;
    use test_log::test;

    #[test]
    fn test_duty_cycles_follow_settings() {
        let (study, _) = normalize(current_v1_document()).unwrap();
        assert_eq!(
            study.duty_cycle("accelerometer"),
            Some(DutyCycle { cycle_seconds: 1200 })
        );
        assert_eq!(
            study.duty_cycle("bluetooth"),
            Some(DutyCycle { cycle_seconds: 300 })
        );
        assert_eq!(study.duty_cycle("calls"), None);
        // gyro is disabled in the fixture
        assert_eq!(study.duty_cycle("gyro"), None);
    }

    #[test]
    fn test_unusable_duty_cycles_are_ignored() {
        let mut doc = current_v1_document();
        doc["device_settings"]["gps_on_duration_seconds"] = json!(i64::MAX);
        doc["device_settings"]["gps_off_duration_seconds"] = json!(10);
        doc["device_settings"]["accelerometer_off_duration_seconds"] = json!(-600);
        doc["device_settings"]["bluetooth_on_duration_seconds"] = json!(600);
        let (study, _) = normalize(doc).unwrap();
        assert_eq!(study.duty_cycle("gps"), None);
        assert_eq!(study.duty_cycle("accelerometer"), None);
        // on longer than the whole bluetooth period
        assert_eq!(study.duty_cycle("bluetooth"), None);
        assert_eq!(study.duty_cycle("wifi"), Some(DutyCycle { cycle_seconds: 300 }));
    }

    #[test]
    fn test_unknown_key_order_does_not_matter() {
        let mut first = current_v1_document();
        first["device_settings"]["zz_extra"] = json!(1);
        first["device_settings"]["aa_extra"] = json!(2);
        first["surveys"][0]["settings"]["zz_option"] = json!(true);
        first["surveys"][0]["settings"]["aa_option"] = json!(false);
        let mut second = current_v1_document();
        second["device_settings"]["aa_extra"] = json!(2);
        second["device_settings"]["zz_extra"] = json!(1);
        second["surveys"][0]["settings"]["aa_option"] = json!(false);
        second["surveys"][0]["settings"]["zz_option"] = json!(true);
        let (a, _) = normalize(first).unwrap();
        let (b, _) = normalize(second).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_ignores_formatting() {
        let (study, _) = normalize(legacy_document()).unwrap();
        let pretty = serde_json::to_string_pretty(study.raw()).unwrap();
        let (reparsed, _) = normalize(serde_json::from_str(&pretty).unwrap()).unwrap();
        assert_eq!(study.fingerprint(), reparsed.fingerprint());
        assert_eq!(study.fingerprint().len(), 64);
    }
}
