use serde_json::{Map, Value};

use super::{
    format::{detect, document_parts},
    schema::{is_claimed, unwrap_extended, Category, Setting, SettingValue, CATALOG},
    study_identifier, FormatVariant, NameRegistry, Study, Survey, Warning, DEFAULT_STUDY_NAME,
};
use crate::error::RegistryError;

const DOCUMENT_KEYS: [&str; 2] = ["device_settings", "surveys"];

/// Resolve every catalog attribute for `format`, then append the keys nothing claims.
fn resolve_settings(
    format: FormatVariant,
    raw: &Map<String, Value>,
    warnings: &mut Vec<Warning>,
) -> Vec<Setting> {
    let mut settings: Vec<Setting> = CATALOG
        .iter()
        .map(|attr| Setting {
            name: attr.name.to_string(),
            category: attr.category,
            value: attr.resolve(format, raw),
        })
        .collect();
    for (key, value) in raw.iter().filter(|(key, _)| !is_claimed(key)) {
        let warning = Warning::UnknownSetting { key: key.clone() };
        tracing::warn!("{warning}");
        warnings.push(warning);
        settings.push(Setting {
            name: key.clone(),
            category: Category::Unclassified,
            value: SettingValue::Found(unwrap_extended(value)),
        });
    }
    settings
}

/// Build the canonical [Study] for a configuration document.
///
/// Unrecognized keys, survey types and question types become [Warning]s. Only a document that
/// lacks the expected shape fails, with [RegistryError::MalformedDocument].
pub fn normalize(raw: Value) -> Result<(Study, Vec<Warning>), RegistryError> {
    normalize_named(raw, DEFAULT_STUDY_NAME)
}

pub(crate) fn normalize_named(
    raw: Value,
    study_name: &str,
) -> Result<(Study, Vec<Warning>), RegistryError> {
    let format = detect(&raw)?;
    tracing::debug!("Normalizing {format} configuration '{study_name}'");
    let parts = document_parts(&raw)?;
    let mut warnings = Vec::new();

    if let Some(root) = raw.as_object() {
        for key in root.keys().filter(|k| !DOCUMENT_KEYS.contains(&k.as_str())) {
            let warning = Warning::UnknownDocumentKey { key: key.clone() };
            tracing::warn!("{warning}");
            warnings.push(warning);
        }
    }

    let settings = resolve_settings(format, parts.device_settings, &mut warnings);
    let identifier = study_identifier(&settings)?;
    let surveys = parts
        .surveys
        .iter()
        .enumerate()
        .map(|(i, survey)| Survey::from_raw(survey, i, format, &mut warnings))
        .collect::<Result<Vec<_>, _>>()?;

    let names = NameRegistry::assign_defaults(&identifier, study_name, &surveys);
    if let Some(name) = names.duplicate() {
        // Only possible when one identifier appears twice in the document.
        tracing::warn!("Default name '{name}' is assigned twice in study {identifier}");
    }
    tracing::info!(
        "Normalized study {identifier}: {} surveys, {} warnings",
        surveys.len(),
        warnings.len()
    );
    let study = Study::new(
        identifier,
        format,
        settings,
        surveys,
        warnings.clone(),
        names,
        raw,
    );
    Ok((study, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{current_v1_document, current_v2_document, legacy_document};
    use serde_json::json;
    use test_log::test;

    #[test]
    fn test_identifiers_stable_across_formats() {
        let studies: Vec<Study> = [legacy_document(), current_v1_document(), current_v2_document()]
            .into_iter()
            .map(|doc| normalize(doc).unwrap().0)
            .collect();
        assert_eq!(studies[0].format(), FormatVariant::LegacyExtendedJson);
        assert_eq!(studies[1].format(), FormatVariant::CurrentV1);
        assert_eq!(studies[2].format(), FormatVariant::CurrentV2);
        let ids = |s: &Study| s.object_identifiers().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(ids(&studies[0]), ids(&studies[1]));
        assert_eq!(ids(&studies[1]), ids(&studies[2]));
        assert_eq!(studies[0], studies[1]);
        assert_eq!(studies[1], studies[2]);
    }

    #[test]
    fn test_missing_attributes_get_not_found() {
        let doc = json!({
            "device_settings": {"id": 7, "accelerometer": true},
            "surveys": []
        });
        let (study, warnings) = normalize(doc).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(study.identifier(), "7");
        assert_eq!(study.setting("gps"), &SettingValue::NotFound);
        assert_eq!(study.setting("accelerometer"), &SettingValue::Found(json!(true)));
        assert_eq!(study.name(), DEFAULT_STUDY_NAME);
    }

    #[test]
    fn test_unknown_setting_is_kept_and_warned() {
        let doc = json!({
            "device_settings": {"id": 7, "experimental_mode": {"$numberInt": "2"}},
            "surveys": []
        });
        let (study, warnings) = normalize(doc).unwrap();
        assert_eq!(
            warnings,
            vec![Warning::UnknownSetting {
                key: "experimental_mode".to_string()
            }]
        );
        let unknown: Vec<_> = study.settings_in(Category::Unclassified).collect();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].value, SettingValue::Found(json!(2)));
    }

    #[test]
    fn test_settings_change_breaks_equality() {
        let (a, _) = normalize(current_v1_document()).unwrap();
        let mut doc = current_v1_document();
        doc["device_settings"]["gps_on_duration_seconds"] = json!(30);
        let (b, _) = normalize(doc).unwrap();
        assert_ne!(a, b);
    }
}
