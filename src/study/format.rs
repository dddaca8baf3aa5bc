//! Recognition of the serialization a configuration document uses.

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

use crate::error::RegistryError;

/// Device-setting keys that only exist in the second current format.
pub const V2_MARKERS: [&str; 3] = [
    "use_anonymized_hashing",
    "use_gps_fuzzing",
    "call_clinician_button_enabled",
];

/// Known serializations of a study configuration.
#[derive(EnumSetType, Debug, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[enumset(serialize_repr = "list")]
pub enum FormatVariant {
    /// MongoDB Extended JSON, objects identified by `_id: {"$oid": ...}`.
    LegacyExtendedJson,
    /// Objects identified by `object_id`, surveys carry a `deleted` flag.
    CurrentV1,
    /// `CurrentV1` plus anonymization and clinician-button settings.
    CurrentV2,
}

impl FormatVariant {
    pub fn all() -> EnumSet<FormatVariant> {
        EnumSet::all()
    }

    pub fn current() -> EnumSet<FormatVariant> {
        FormatVariant::CurrentV1 | FormatVariant::CurrentV2
    }

    /// Current formats carry an explicit survey deletion flag.
    pub fn has_deletion_flag(&self) -> bool {
        *self != FormatVariant::LegacyExtendedJson
    }
}

impl Display for FormatVariant {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let label = match self {
            FormatVariant::LegacyExtendedJson => "legacy (MongoDB Extended JSON)",
            FormatVariant::CurrentV1 => "current (v1)",
            FormatVariant::CurrentV2 => "current (v2)",
        };
        write!(f, "{label}")
    }
}

/// Borrowed view of the two top level sections every format shares.
pub struct DocumentParts<'a> {
    pub device_settings: &'a Map<String, Value>,
    pub surveys: &'a Vec<Value>,
}

/// Split a document into its device settings and survey list, or fail with
/// [RegistryError::MalformedDocument] naming the missing section.
pub fn document_parts(raw: &Value) -> Result<DocumentParts<'_>, RegistryError> {
    let root = raw
        .as_object()
        .ok_or_else(|| RegistryError::malformed("$", "expected a JSON object"))?;
    let device_settings = root
        .get("device_settings")
        .and_then(Value::as_object)
        .ok_or_else(|| RegistryError::malformed("device_settings", "expected an object"))?;
    let surveys = root
        .get("surveys")
        .and_then(Value::as_array)
        .ok_or_else(|| RegistryError::malformed("surveys", "expected an array"))?;
    Ok(DocumentParts {
        device_settings,
        surveys,
    })
}

/// Classify a document by its marker keys.
///
/// Surveys are the primary evidence; device settings decide only when the survey list is empty.
pub fn detect(raw: &Value) -> Result<FormatVariant, RegistryError> {
    let parts = document_parts(raw)?;
    let survey_objects = parts.surveys.iter().filter_map(Value::as_object);

    let mut legacy_surveys = 0;
    let mut current_surveys = 0;
    for survey in survey_objects {
        if survey.contains_key("object_id") {
            current_surveys += 1;
        } else if survey.contains_key("_id") {
            legacy_surveys += 1;
        }
    }
    let settings = parts.device_settings;

    let legacy = if legacy_surveys + current_surveys > 0 {
        legacy_surveys > 0 && current_surveys == 0
    } else {
        settings.contains_key("_id")
            && !settings.contains_key("id")
            && !settings.contains_key("object_id")
    };
    if legacy {
        return Ok(FormatVariant::LegacyExtendedJson);
    }
    if V2_MARKERS.iter().all(|key| settings.contains_key(*key)) {
        return Ok(FormatVariant::CurrentV2);
    }
    if current_surveys > 0 || settings.contains_key("id") || settings.contains_key("object_id") {
        return Ok(FormatVariant::CurrentV1);
    }
    Err(RegistryError::malformed(
        "device_settings",
        "no study identifier key found",
    ))
}
