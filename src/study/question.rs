use serde_json::{Map, Value};

use super::{
    schema::{unwrap_extended, QUESTION_INFO},
    Warning,
};
use crate::{error::RegistryError, summary::Summary};

/// Type-specific content of a tracking question.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    InfoTextBox,
    Checkbox { answers: Vec<String> },
    RadioButton { answers: Vec<String> },
    Slider { min: Option<Value>, max: Option<Value> },
    FreeResponse { text_field_type: Option<String> },
    /// Unrecognized `question_type`; its content is kept in [Question::extra].
    Unknown,
}

impl QuestionKind {
    fn type_keys(question_type: &str) -> &'static [&'static str] {
        match question_type {
            "checkbox" | "radio_button" => &["answers"],
            "slider" => &["min", "max"],
            "free_response" => &["text_field_type"],
            _ => &[],
        }
    }
}

/// One question of a tracking survey.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub identifier: String,
    pub question_type: String,
    pub text: Option<String>,
    pub kind: QuestionKind,
    /// Branching logic (`display_if`), preserved verbatim and never interpreted.
    pub logic: Option<Value>,
    /// Keys outside the shared and type-specific sets.
    pub extra: Map<String, Value>,
}

fn answer_labels(raw: &Map<String, Value>, key: &str) -> Result<Vec<String>, RegistryError> {
    let Some(answers) = raw.get("answers") else {
        return Ok(Vec::new());
    };
    let answers = answers
        .as_array()
        .ok_or_else(|| RegistryError::malformed(format!("{key}.answers"), "expected an array"))?;
    answers
        .iter()
        .enumerate()
        .map(|(i, answer)| {
            // Each answer is a one-entry object such as {"text": "Never"}.
            let label = match answer {
                Value::Object(map) => map.values().next(),
                other => Some(other),
            };
            match label {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(other) => Ok(other.to_string()),
                None => Err(RegistryError::malformed(
                    format!("{key}.answers[{i}]"),
                    "empty answer",
                )),
            }
        })
        .collect()
}

impl Question {
    /// Read one entry of a tracking survey's `content`. `key` locates it in the document for
    /// error messages.
    pub fn from_raw(
        raw: &Value,
        key: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<Question, RegistryError> {
        let raw = raw
            .as_object()
            .ok_or_else(|| RegistryError::malformed(key, "expected a question object"))?;
        let identifier = match raw.get("question_id").map(unwrap_extended) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(RegistryError::malformed(key, "missing question_id")),
        };
        let question_type = raw
            .get("question_type")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistryError::malformed(key, "missing question_type"))?
            .to_string();
        let text = raw
            .get("question_text")
            .and_then(Value::as_str)
            .map(str::to_string);
        let logic = match raw.get("display_if") {
            None | Some(Value::Null) => None,
            Some(logic) => Some(logic.clone()),
        };

        let kind = match question_type.as_str() {
            "info_text_box" => QuestionKind::InfoTextBox,
            "checkbox" => QuestionKind::Checkbox {
                answers: answer_labels(raw, key)?,
            },
            "radio_button" => QuestionKind::RadioButton {
                answers: answer_labels(raw, key)?,
            },
            "slider" => QuestionKind::Slider {
                min: raw.get("min").map(unwrap_extended),
                max: raw.get("max").map(unwrap_extended),
            },
            "free_response" => QuestionKind::FreeResponse {
                text_field_type: raw
                    .get("text_field_type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            other => {
                let warning = Warning::UnknownQuestionType {
                    question: identifier.clone(),
                    question_type: other.to_string(),
                };
                tracing::warn!("{warning}");
                warnings.push(warning);
                QuestionKind::Unknown
            }
        };

        let type_keys = QuestionKind::type_keys(&question_type);
        let extra = raw
            .iter()
            .filter(|(k, _)| !QUESTION_INFO.contains(&k.as_str()) && !type_keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), unwrap_extended(v)))
            .collect();

        Ok(Question {
            identifier,
            question_type,
            text,
            kind,
            logic,
            extra,
        })
    }

    /// Answer labels in document order; a label's score is its position.
    pub fn answers(&self) -> &[String] {
        match &self.kind {
            QuestionKind::Checkbox { answers } | QuestionKind::RadioButton { answers } => answers,
            _ => &[],
        }
    }

    pub fn uses_logic(&self) -> bool {
        self.logic.is_some()
    }

    pub fn summary(&self, name: &str) -> Summary {
        let mut summary = Summary::with_header(name)
            .text("question_id", &self.identifier)
            .text("question_type", &self.question_type)
            .maybe("question_text", self.text.as_ref())
            .text(
                "display_if",
                if self.uses_logic() {
                    "Uses branching logic, see configuration file for details."
                } else {
                    "Does not use branching logic."
                },
            );
        match &self.kind {
            QuestionKind::Checkbox { answers } | QuestionKind::RadioButton { answers } => {
                let numbered = answers
                    .iter()
                    .enumerate()
                    .fold(Summary::new(), |acc, (i, a)| acc.text(i.to_string(), a));
                summary = summary.nested("answers", numbered);
            }
            QuestionKind::Slider { min, max } => {
                summary = summary.maybe("min", min.as_ref()).maybe("max", max.as_ref());
            }
            QuestionKind::FreeResponse { text_field_type } => {
                summary = summary.maybe("text_field_type", text_field_type.as_ref());
            }
            QuestionKind::InfoTextBox | QuestionKind::Unknown => {}
        }
        for (key, value) in self.extra.iter() {
            summary = summary.text(key.clone(), value);
        }
        summary
    }
}
