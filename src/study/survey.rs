use serde_json::{Map, Value};

use super::{
    question::Question,
    schema::{
        unwrap_extended, Category, Setting, SettingValue, AUDIO_SURVEY_SETTINGS, SURVEY_INFO,
        TRACKING_SURVEY_SETTINGS,
    },
    FormatVariant, NameRegistry, Warning,
};
use crate::{
    error::RegistryError,
    summary::Summary,
    time::{clock_time, DAY_ORDER},
};

/// Weekly delivery times. Seven Sunday-first sequences of seconds after local midnight; an
/// empty sequence means no delivery that day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliverySchedule([Vec<i64>; 7]);

impl DeliverySchedule {
    pub fn from_raw(raw: Option<&Value>, key: &str) -> Result<DeliverySchedule, RegistryError> {
        let Some(raw) = raw else {
            return Ok(DeliverySchedule::default());
        };
        let days = unwrap_extended(raw);
        let days = days
            .as_array()
            .filter(|days| days.len() == 7)
            .ok_or_else(|| RegistryError::malformed(key, "expected 7 day sequences"))?;
        let mut schedule = DeliverySchedule::default();
        for (i, day) in days.iter().enumerate() {
            let times = day.as_array().ok_or_else(|| {
                RegistryError::malformed(format!("{key}[{i}]"), "expected a sequence of seconds")
            })?;
            for time in times {
                let seconds = time.as_i64().ok_or_else(|| {
                    RegistryError::malformed(format!("{key}[{i}]"), "expected integer seconds")
                })?;
                schedule.0[i].push(seconds);
            }
        }
        Ok(schedule)
    }

    pub fn day(&self, index: usize) -> &[i64] {
        self.0.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Vec::is_empty)
    }

    pub fn summary(&self) -> Summary {
        DAY_ORDER
            .iter()
            .zip(self.0.iter())
            .fold(Summary::new(), |acc, (day, times)| {
                acc.list(&day[0..3], times.iter().map(|s| clock_time(*s)))
            })
    }
}

/// Variant-specific survey content.
#[derive(Debug, Clone, PartialEq)]
pub enum SurveyKind {
    Audio { prompt: Option<String> },
    Tracking { questions: Vec<Question> },
    /// Any other `survey_type`, e.g. the `dummy` placeholder left by deleted surveys.
    Generic { content: Value },
}

impl SurveyKind {
    pub fn folder(&self) -> &'static str {
        match self {
            SurveyKind::Audio { .. } => "audio_surveys",
            SurveyKind::Tracking { .. } => "tracking_surveys",
            SurveyKind::Generic { .. } => "other_surveys",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Survey {
    pub identifier: String,
    pub survey_type: String,
    /// `None` when the format does not record deletion.
    pub deleted: Option<bool>,
    pub schedule: DeliverySchedule,
    pub settings: Vec<Setting>,
    pub kind: SurveyKind,
}

impl PartialEq for Survey {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.survey_type == other.survey_type
            && self.is_deleted() == other.is_deleted()
            && self.schedule == other.schedule
            && self.settings == other.settings
            && self.kind == other.kind
    }
}

fn survey_identifier(raw: &Map<String, Value>, key: &str) -> Result<String, RegistryError> {
    for id_key in ["object_id", "_id"] {
        match raw.get(id_key).map(unwrap_extended) {
            Some(Value::String(s)) => return Ok(s),
            Some(Value::Number(n)) => return Ok(n.to_string()),
            _ => continue,
        }
    }
    Err(RegistryError::malformed(key, "missing survey identifier"))
}

fn load_settings(
    known: &[&str],
    raw: Option<&Value>,
    survey: &str,
    key: &str,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<Setting>, RegistryError> {
    let empty = Map::new();
    let raw = match raw {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => return Err(RegistryError::malformed(format!("{key}.settings"), "expected an object")),
    };
    let mut settings: Vec<Setting> = known
        .iter()
        .map(|&name| Setting {
            name: name.to_string(),
            category: Category::Survey,
            value: raw
                .get(name)
                .map(|v| SettingValue::Found(unwrap_extended(v)))
                .unwrap_or(SettingValue::NotFound),
        })
        .collect();
    let mut unknown: Vec<(&String, &Value)> = raw
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .collect();
    unknown.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in unknown {
        let warning = Warning::UnknownSurveySetting {
            survey: survey.to_string(),
            key: name.clone(),
        };
        tracing::warn!("{warning}");
        warnings.push(warning);
        settings.push(Setting {
            name: name.clone(),
            category: Category::Unclassified,
            value: SettingValue::Found(unwrap_extended(value)),
        });
    }
    Ok(settings)
}

impl Survey {
    /// Read `surveys[index]` of a document in the given format.
    pub fn from_raw(
        raw: &Value,
        index: usize,
        format: FormatVariant,
        warnings: &mut Vec<Warning>,
    ) -> Result<Survey, RegistryError> {
        let key = format!("surveys[{index}]");
        let raw = raw
            .as_object()
            .ok_or_else(|| RegistryError::malformed(&key, "expected a survey object"))?;
        let identifier = survey_identifier(raw, &key)?;
        let survey_type = raw
            .get("survey_type")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistryError::malformed(format!("{key}.survey_type"), "expected a string"))?
            .to_string();
        let deleted = if format.has_deletion_flag() {
            Some(raw.get("deleted").and_then(Value::as_bool).unwrap_or(false))
        } else {
            raw.get("deleted").and_then(Value::as_bool)
        };
        let schedule = DeliverySchedule::from_raw(raw.get("timings"), &format!("{key}.timings"))?;

        for unknown in raw.keys().filter(|k| !SURVEY_INFO.contains(&k.as_str())) {
            let warning = Warning::UnknownDocumentKey {
                key: format!("{key}.{unknown}"),
            };
            tracing::warn!("{warning}");
            warnings.push(warning);
        }

        let content = raw.get("content");
        let (settings, kind) = match survey_type.as_str() {
            "audio_survey" => {
                let settings = load_settings(
                    AUDIO_SURVEY_SETTINGS,
                    raw.get("settings"),
                    &identifier,
                    &key,
                    warnings,
                )?;
                let prompt = content
                    .and_then(|c| c.get(0))
                    .and_then(|first| first.get("prompt"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                (settings, SurveyKind::Audio { prompt })
            }
            "tracking_survey" => {
                let settings = load_settings(
                    TRACKING_SURVEY_SETTINGS,
                    raw.get("settings"),
                    &identifier,
                    &key,
                    warnings,
                )?;
                let items = match content {
                    None | Some(Value::Null) => &[][..],
                    Some(Value::Array(items)) => items.as_slice(),
                    Some(_) => {
                        return Err(RegistryError::malformed(
                            format!("{key}.content"),
                            "expected an array of questions",
                        ))
                    }
                };
                let questions = items
                    .iter()
                    .enumerate()
                    .map(|(j, q)| Question::from_raw(q, &format!("{key}.content[{j}]"), warnings))
                    .collect::<Result<Vec<_>, _>>()?;
                (settings, SurveyKind::Tracking { questions })
            }
            other => {
                let warning = Warning::UnknownSurveyType {
                    survey: identifier.clone(),
                    survey_type: other.to_string(),
                };
                tracing::warn!("{warning}");
                warnings.push(warning);
                let settings = match raw.get("settings").map(unwrap_extended) {
                    Some(Value::Object(map)) => map
                        .into_iter()
                        .map(|(name, value)| Setting {
                            name,
                            category: Category::Unclassified,
                            value: SettingValue::Found(value),
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                let content = content.map(unwrap_extended).unwrap_or(Value::Null);
                (settings, SurveyKind::Generic { content })
            }
        };

        Ok(Survey {
            identifier,
            survey_type,
            deleted,
            schedule,
            settings,
            kind,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }

    pub fn questions(&self) -> &[Question] {
        match &self.kind {
            SurveyKind::Tracking { questions } => questions,
            _ => &[],
        }
    }

    pub fn summary(&self, names: &NameRegistry) -> Summary {
        let info = Summary::new()
            .text("identifier", &self.identifier)
            .text("survey_type", &self.survey_type)
            .maybe("deleted", self.deleted);
        let settings = self
            .settings
            .iter()
            .fold(Summary::new(), |acc, s| acc.text(s.name.clone(), &s.value));
        let summary = Summary::with_header(names.label(&self.identifier))
            .nested("Info", info)
            .nested("Settings", settings)
            .nested("Timings", self.schedule.summary());
        match &self.kind {
            SurveyKind::Audio { prompt } => summary.maybe("Prompt", prompt.as_ref()),
            SurveyKind::Tracking { questions } => {
                let nested = questions.iter().fold(Summary::new(), |acc, q| {
                    let name = names.label(&q.identifier);
                    acc.nested(name.clone(), q.summary(&name))
                });
                summary.nested("Questions", nested)
            }
            SurveyKind::Generic { content } => summary.text("Content", content),
        }
    }
}
