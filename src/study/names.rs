//! Human readable names for identified objects.
//!
//! A [NameRegistry] is a plain value: defaults are a pure function of document order, and every
//! mutation either succeeds completely or leaves the registry untouched.

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use super::Survey;
use crate::error::RegistryError;

#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    assignments: Vec<(String, String)>,
    defaults: bool,
}

impl PartialEq for NameRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.assignments == other.assignments
    }
}

impl Eq for NameRegistry {}

impl NameRegistry {
    /// Default names: the study name, `Survey <n>` in document order, and
    /// `Survey <n> - Question <m>` per survey.
    pub fn assign_defaults(study_id: &str, study_name: &str, surveys: &[Survey]) -> NameRegistry {
        let mut assignments = vec![(study_id.to_string(), study_name.to_string())];
        for (i, survey) in surveys.iter().enumerate() {
            let survey_name = format!("Survey {}", i + 1);
            assignments.push((survey.identifier.clone(), survey_name.clone()));
            assignments.extend(survey.questions().iter().enumerate().map(|(j, question)| {
                (
                    question.identifier.clone(),
                    format!("{survey_name} - Question {}", j + 1),
                )
            }));
        }
        NameRegistry {
            assignments,
            defaults: true,
        }
    }

    pub fn is_default(&self) -> bool {
        self.defaults
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments
            .iter()
            .map(|(id, name)| (id.as_str(), name.as_str()))
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(id, _)| id.as_str())
    }

    pub fn name(&self, identifier: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, name)| name.as_str())
    }

    /// The assigned name, or the identifier itself for unknown objects.
    pub fn label(&self, identifier: &str) -> String {
        self.name(identifier).unwrap_or(identifier).to_string()
    }

    /// Reverse lookup. `None` when the name is unknown or not unique.
    pub fn identifier(&self, name: &str) -> Option<&str> {
        let mut matches = self.assignments.iter().filter(|(_, n)| n == name);
        match (matches.next(), matches.next()) {
            (Some((id, _)), None) => Some(id.as_str()),
            _ => None,
        }
    }

    /// First name held by more than one identifier, if any.
    pub fn duplicate(&self) -> Option<&str> {
        let mut seen = BTreeSet::new();
        self.assignments
            .iter()
            .map(|(_, name)| name.as_str())
            .find(|name| !seen.insert(*name))
    }

    fn commit(&mut self, assignments: Vec<(String, String)>) -> Result<(), RegistryError> {
        let candidate = NameRegistry {
            assignments,
            defaults: false,
        };
        if let Some(name) = candidate.duplicate() {
            tracing::warn!("Name assignment rejected, '{name}' is not unique");
            return Err(RegistryError::NameCollision {
                name: name.to_string(),
            });
        }
        *self = candidate;
        Ok(())
    }

    /// Rename objects. Keys are current names, values are new names. Fails without changes if
    /// the result would contain a duplicate name.
    pub fn update(&mut self, renames: &BTreeMap<String, String>) -> Result<(), RegistryError> {
        let assignments = self
            .assignments
            .iter()
            .map(|(id, name)| {
                let name = renames.get(name).unwrap_or(name);
                (id.clone(), name.clone())
            })
            .collect();
        self.commit(assignments)
    }

    /// Apply a previously exported identifier to name mapping. Identifiers this registry does
    /// not know are ignored.
    pub fn load(&mut self, persisted: &NameRegistry) -> Result<(), RegistryError> {
        let assignments = self
            .assignments
            .iter()
            .map(|(id, name)| {
                let name = persisted.name(id).unwrap_or(name);
                (id.clone(), name.to_string())
            })
            .collect();
        self.commit(assignments)
    }
}

impl Serialize for NameRegistry {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(self.assignments.len()))?;
        for (id, name) in self.assignments.iter() {
            map.serialize_entry(id, name)?;
        }
        map.end()
    }
}

struct NameRegistryVisitor;

impl<'de> Visitor<'de> for NameRegistryVisitor {
    type Value = NameRegistry;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a map from identifier to name")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<NameRegistry, A::Error> {
        let mut assignments: Vec<(String, String)> = Vec::new();
        while let Some((id, name)) = access.next_entry::<String, String>()? {
            match assignments.iter_mut().find(|(known, _)| *known == id) {
                Some(entry) => entry.1 = name,
                None => assignments.push((id, name)),
            }
        }
        Ok(NameRegistry {
            assignments,
            defaults: false,
        })
    }
}

impl<'de> Deserialize<'de> for NameRegistry {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        de.deserialize_map(NameRegistryVisitor)
    }
}
