//! Plain-text summaries of studies, users and projects.
//!
//! A [Summary] is an ordered tree of labelled items. It never inspects the model it describes;
//! callers build one from read-only accessors and render it with [Summary::render].

use std::{fmt::Display, fs, path::Path};

use crate::error::RegistryError;

/// Rendering options shared by every exported text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub indent: usize,
    pub max_width: usize,
    /// Draw horizontal rules around top level labels.
    pub rule_zero: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            indent: 4,
            max_width: 70,
            rule_zero: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryItem {
    Text(String),
    List(Vec<String>),
    Nested(Summary),
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    header: Option<String>,
    entries: Vec<(String, SummaryItem)>,
}

impl Summary {
    pub fn new() -> Self {
        Summary::default()
    }

    pub fn with_header(header: impl Into<String>) -> Self {
        Summary {
            header: Some(header.into()),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn text(mut self, label: impl Into<String>, value: impl Display) -> Self {
        self.entries
            .push((label.into(), SummaryItem::Text(value.to_string())));
        self
    }

    pub fn maybe<T: Display>(mut self, label: impl Into<String>, value: Option<T>) -> Self {
        let item = match value {
            Some(v) => SummaryItem::Text(v.to_string()),
            None => SummaryItem::Missing,
        };
        self.entries.push((label.into(), item));
        self
    }

    pub fn list<I, T>(mut self, label: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.entries.push((label.into(), SummaryItem::List(values)));
        self
    }

    pub fn nested(mut self, label: impl Into<String>, summary: Summary) -> Self {
        self.entries
            .push((label.into(), SummaryItem::Nested(summary)));
        self
    }

    fn to_lines(&self, level: usize, layout: &Layout) -> Vec<(usize, String)> {
        let sep = ": ";
        let rules = level == 0 && layout.rule_zero;
        let rule = "-".repeat(layout.max_width);
        let mut lines = Vec::new();
        let mut push_label = |lines: &mut Vec<(usize, String)>, label: &str| {
            if rules {
                lines.push((0, String::new()));
                lines.push((0, rule.clone()));
                lines.push((0, label.to_string()));
                lines.push((0, rule.clone()));
            } else {
                lines.push((level * layout.indent, format!("{label}:")));
            }
        };
        for (label, item) in self.entries.iter() {
            let scalar = match item {
                SummaryItem::Text(text) => Some(text.clone()),
                SummaryItem::List(values) => Some(values.join(", ")),
                SummaryItem::Missing => Some("Not found".to_string()),
                SummaryItem::Nested(_) => None,
            };
            match (scalar, item) {
                (Some(text), _) => {
                    let inline = level * layout.indent + label.len() + sep.len() + text.len();
                    if rules || inline > layout.max_width || text.contains('\n') {
                        push_label(&mut lines, label);
                        lines.push(((level + 1) * layout.indent, text));
                    } else {
                        lines.push((level * layout.indent, format!("{label}{sep}{text}")));
                    }
                }
                (None, SummaryItem::Nested(nested)) => {
                    push_label(&mut lines, label);
                    if let Some(header) = &nested.header {
                        lines.push(((level + 1) * layout.indent, header.clone()));
                    }
                    lines.extend(nested.to_lines(level + 1, layout));
                }
                (None, _) => {}
            }
        }
        lines
    }

    /// Render to a width-wrapped string.
    pub fn render(&self, layout: &Layout) -> String {
        let mut out = String::new();
        if let Some(header) = &self.header {
            out.push('\n');
            out.push_str(header);
            out.push('\n');
        }
        for (indent, text) in self.to_lines(0, layout) {
            if text.is_empty() {
                out.push('\n');
                continue;
            }
            for paragraph in text.lines() {
                for line in wrap(paragraph, indent, layout.max_width) {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
        out
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P, layout: &Layout) -> Result<(), RegistryError> {
        tracing::debug!("Writing summary to {:?}", path.as_ref());
        fs::write(path, self.render(layout))?;
        Ok(())
    }
}

fn wrap(text: &str, indent: usize, max_width: usize) -> Vec<String> {
    let pad = " ".repeat(indent);
    let width = max_width.saturating_sub(indent).max(20);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(format!("{pad}{current}"));
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(format!("{pad}{current}"));
    }
    lines
}
