// Catalog of canonical study attributes.
//
// Each canonical attribute lists the source keys that carry it in each known format. Adding a
// format means adding source entries here; normalization never branches on format itself.

use enumset::{EnumSet, EnumSetType};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt::{Display, Formatter};

use super::format::FormatVariant;

/// Purpose groups for device settings.
#[derive(EnumSetType, Debug, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[enumset(serialize_repr = "list")]
pub enum Category {
    /// Identifiers and record-keeping. Never part of semantic equality.
    Record,
    Survey,
    App,
    Display,
    Passive,
    /// Keys no catalog entry claims.
    Unclassified,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::Record,
            Category::Survey,
            Category::App,
            Category::Display,
            Category::Passive,
            Category::Unclassified,
        ]
    }

    pub fn compared() -> EnumSet<Category> {
        EnumSet::all() - Category::Record
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Record => "Identifiers",
            Category::Survey => "Survey Settings",
            Category::App => "App Settings",
            Category::Display => "Display Settings",
            Category::Passive => "Passive Data Settings",
            Category::Unclassified => "Other/Unknown Settings",
        }
    }
}

/// Where one format stores a canonical attribute.
#[derive(Debug, Clone, Copy)]
pub struct Source {
    pub formats: EnumSet<FormatVariant>,
    pub key: &'static str,
}

#[derive(Debug, Clone)]
pub struct CanonicalAttribute {
    pub name: &'static str,
    pub category: Category,
    pub sources: Vec<Source>,
}

impl CanonicalAttribute {
    /// Formats that define this attribute at all.
    pub fn formats(&self) -> EnumSet<FormatVariant> {
        self.sources
            .iter()
            .fold(EnumSet::empty(), |acc, source| acc | source.formats)
    }

    pub fn claims(&self, key: &str) -> bool {
        self.sources.iter().any(|source| source.key == key)
    }

    /// Probe the source keys for `format` in order, unwrapping extended JSON scalars.
    pub fn resolve(&self, format: FormatVariant, raw: &Map<String, Value>) -> SettingValue {
        self.sources
            .iter()
            .filter(|source| source.formats.contains(format))
            .find_map(|source| raw.get(source.key))
            .map(|value| SettingValue::Found(unwrap_extended(value)))
            .unwrap_or(SettingValue::NotFound)
    }
}

/// An attribute value, or the explicit marker for "checked, absent".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingValue {
    NotFound,
    Found(Value),
}

impl SettingValue {
    pub fn value(&self) -> Option<&Value> {
        match self {
            SettingValue::Found(value) => Some(value),
            SettingValue::NotFound => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.value().and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value().and_then(Value::as_bool)
    }
}

impl Display for SettingValue {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SettingValue::NotFound => write!(f, "Not found"),
            SettingValue::Found(Value::String(s)) => write!(f, "{s}"),
            SettingValue::Found(Value::Null) => write!(f, "None"),
            SettingValue::Found(value) => write!(f, "{value}"),
        }
    }
}

/// One resolved setting.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub name: String,
    pub category: Category,
    pub value: SettingValue,
}

/// Replace MongoDB Extended JSON scalar wrappers with plain values.
pub fn unwrap_extended(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 => {
            let (key, inner) = map.iter().next().map(|(k, v)| (k.as_str(), v)).unwrap_or(("", value));
            match (key, inner) {
                ("$oid", Value::String(s)) => Value::String(s.clone()),
                ("$date", inner) => match unwrap_extended(inner) {
                    Value::Object(_) => inner.clone(),
                    plain => plain,
                },
                ("$numberLong" | "$numberInt", Value::String(s)) => s
                    .parse::<i64>()
                    .map(|n| Value::Number(n.into()))
                    .unwrap_or_else(|_| value.clone()),
                ("$numberDouble", Value::String(s)) => s
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| value.clone()),
                _ => Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), unwrap_extended(v)))
                        .collect(),
                ),
            }
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), unwrap_extended(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(unwrap_extended).collect()),
        other => other.clone(),
    }
}

fn every(key: &'static str) -> Vec<Source> {
    vec![Source {
        formats: FormatVariant::all(),
        key,
    }]
}

fn only(formats: EnumSet<FormatVariant>, key: &'static str) -> Vec<Source> {
    vec![Source { formats, key }]
}

fn attribute(name: &'static str, category: Category, sources: Vec<Source>) -> CanonicalAttribute {
    CanonicalAttribute {
        name,
        category,
        sources,
    }
}

const SURVEY_SETTINGS: &[&str] = &[
    "check_for_new_surveys_frequency_seconds",
    "voice_recording_max_time_length_seconds",
];

const APP_SETTINGS: &[&str] = &[
    "allow_upload_over_cellular_data",
    "create_new_data_files_frequency_seconds",
    "upload_data_files_frequency_seconds",
    "seconds_before_auto_logout",
];

const V2_APP_SETTINGS: &[&str] = &[
    "use_anonymized_hashing",
    "use_gps_fuzzing",
    "call_clinician_button_enabled",
    "call_research_assistant_button_enabled",
];

const DISPLAY_SETTINGS: &[&str] = &[
    "about_page_text",
    "call_clinician_button_text",
    "consent_form_text",
    "survey_submit_success_toast_text",
    "consent_sections",
];

const PASSIVE_SETTINGS: &[&str] = &[
    "accelerometer",
    "accelerometer_off_duration_seconds",
    "accelerometer_on_duration_seconds",
    "ambient_audio",
    "bluetooth",
    "bluetooth_global_offset_seconds",
    "bluetooth_on_duration_seconds",
    "bluetooth_total_duration_seconds",
    "calls",
    "devicemotion",
    "devicemotion_off_duration_seconds",
    "devicemotion_on_duration_seconds",
    "gps",
    "gps_off_duration_seconds",
    "gps_on_duration_seconds",
    "gyro",
    "gyro_off_duration_seconds",
    "gyro_on_duration_seconds",
    "magnetometer",
    "magnetometer_off_duration_seconds",
    "magnetometer_on_duration_seconds",
    "power_state",
    "proximity",
    "reachability",
    "texts",
    "wifi",
    "wifi_log_frequency_seconds",
];

/// Canonical name of the study identifier attribute.
pub const STUDY_ID: &str = "study_id";

/// Every known device setting, in export order.
pub static CATALOG: Lazy<Vec<CanonicalAttribute>> = Lazy::new(|| {
    let legacy = EnumSet::only(FormatVariant::LegacyExtendedJson);
    let mut catalog = vec![
        attribute(
            STUDY_ID,
            Category::Record,
            vec![
                Source {
                    formats: FormatVariant::all(),
                    key: "object_id",
                },
                Source {
                    formats: legacy,
                    key: "_id",
                },
                Source {
                    formats: FormatVariant::current(),
                    key: "id",
                },
            ],
        ),
        attribute("study", Category::Record, every("study")),
        attribute("created_on", Category::Record, every("created_on")),
        attribute("last_updated", Category::Record, every("last_updated")),
        attribute(
            "deleted",
            Category::Record,
            only(FormatVariant::current(), "deleted"),
        ),
    ];
    for (category, keys) in [
        (Category::Survey, SURVEY_SETTINGS),
        (Category::App, APP_SETTINGS),
    ] {
        catalog.extend(keys.iter().map(|&key| attribute(key, category, every(key))));
    }
    catalog.extend(V2_APP_SETTINGS.iter().map(|&key| {
        attribute(
            key,
            Category::App,
            only(EnumSet::only(FormatVariant::CurrentV2), key),
        )
    }));
    for (category, keys) in [
        (Category::Display, DISPLAY_SETTINGS),
        (Category::Passive, PASSIVE_SETTINGS),
    ] {
        catalog.extend(keys.iter().map(|&key| attribute(key, category, every(key))));
    }
    catalog
});

pub fn catalog_entry(name: &str) -> Option<&'static CanonicalAttribute> {
    CATALOG.iter().find(|attr| attr.name == name)
}

/// True if any catalog entry reads `key` in some format.
pub fn is_claimed(key: &str) -> bool {
    CATALOG.iter().any(|attr| attr.claims(key))
}

/// Keys every survey object may carry, whatever its type.
pub const SURVEY_INFO: &[&str] = &[
    "_id",
    "id",
    "object_id",
    "study",
    "created_on",
    "last_updated",
    "last_modified",
    "name",
    "survey_type",
    "deleted",
    "settings",
    "timings",
    "content",
];

pub const AUDIO_SURVEY_SETTINGS: &[&str] = &[
    "audio_survey_type",
    "bit_rate",
    "sample_rate",
    "trigger_on_first_download",
];

pub const TRACKING_SURVEY_SETTINGS: &[&str] = &[
    "number_of_random_questions",
    "randomize",
    "randomize_with_memory",
    "trigger_on_first_download",
];

/// Keys shared by every tracking question.
pub const QUESTION_INFO: &[&str] = &["question_id", "question_type", "question_text", "display_if"];

/// Streams whose sampling is governed by `<stream>_on/off_duration_seconds`.
pub const DUTY_CYCLE_STREAMS: &[&str] = &["accelerometer", "devicemotion", "gps", "gyro", "magnetometer"];
