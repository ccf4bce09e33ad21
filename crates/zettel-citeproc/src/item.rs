//! CSL-JSON bibliographic items
//!
//! Items are kept as the raw JSON object they were read from. Typed views
//! (names, dates) are computed on demand and fail with
//! [`EngineError::InvalidField`] when a variable has a shape the processor
//! cannot render; that failure is what integrity checks look for.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};

/// One bibliographic record in CSL-JSON form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CslItem {
    pub id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl CslItem {
    /// Build an item from a parsed CSL-JSON record.
    ///
    /// Numeric ids are accepted and stringified, as CSL-JSON allows them.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(EngineError::InvalidItem(
                "record is not a JSON object".to_string(),
            ));
        };

        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(EngineError::InvalidItem(format!(
                    "id must be a string or number, got {}",
                    other
                )))
            }
            None => return Err(EngineError::InvalidItem("record has no id".to_string())),
        };

        Ok(Self { id, fields })
    }

    pub fn get(&self, variable: &str) -> Option<&Value> {
        self.fields.get(variable)
    }

    /// CSL item type, `document` when absent
    pub fn item_type(&self) -> &str {
        self.fields
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("document")
    }

    pub fn title(&self) -> Option<&str> {
        self.fields
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// A string or number variable as text
    pub fn text(&self, variable: &str) -> Option<String> {
        match self.fields.get(variable)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A name variable (`author`, `editor`, ...)
    pub fn names(&self, variable: &str) -> Result<Option<Vec<Name>>> {
        let Some(value) = self.fields.get(variable) else {
            return Ok(None);
        };
        let Value::Array(entries) = value else {
            return Err(EngineError::invalid_field(
                &self.id,
                variable,
                "expected an array of names",
            ));
        };

        let names = entries
            .iter()
            .map(|entry| Name::from_value(entry).map_err(|reason| {
                EngineError::invalid_field(&self.id, variable, reason)
            }))
            .collect::<Result<Vec<_>>>()?;

        Ok(if names.is_empty() { None } else { Some(names) })
    }

    /// A date variable (`issued`, `accessed`, ...)
    pub fn date(&self, variable: &str) -> Result<Option<DateValue>> {
        match self.fields.get(variable) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => DateValue::from_value(value)
                .map(Some)
                .map_err(|reason| EngineError::invalid_field(&self.id, variable, reason)),
        }
    }
}

/// A personal or institutional name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name {
    pub family: Option<String>,
    pub given: Option<String>,
    pub literal: Option<String>,
    pub non_dropping_particle: Option<String>,
    pub dropping_particle: Option<String>,
    pub suffix: Option<String>,
}

impl Name {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let Value::Object(map) = value else {
            return Err(format!("name entry is not an object: {}", value));
        };

        let part = |key: &str| -> std::result::Result<Option<String>, String> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
                Some(other) => Err(format!("name part `{}` is not a string: {}", key, other)),
            }
        };

        let name = Self {
            family: part("family")?,
            given: part("given")?,
            literal: part("literal")?,
            non_dropping_particle: part("non-dropping-particle")?,
            dropping_particle: part("dropping-particle")?,
            suffix: part("suffix")?,
        };

        if name.family.is_none() && name.literal.is_none() && name.given.is_none() {
            return Err("name has neither family, given nor literal part".to_string());
        }
        Ok(name)
    }

    /// The name as it appears in short citations ("van Gogh", "WHO")
    pub fn short(&self) -> String {
        if let Some(literal) = &self.literal {
            return literal.clone();
        }
        let family = self.family.as_deref().or(self.given.as_deref()).unwrap_or("");
        match &self.non_dropping_particle {
            Some(particle) => format!("{} {}", particle, family),
            None => family.to_string(),
        }
    }

    /// Full name in display order ("Vincent van Gogh Jr.")
    pub fn display(&self) -> String {
        if let Some(literal) = &self.literal {
            return literal.clone();
        }
        let parts = [
            self.given.as_deref(),
            self.dropping_particle.as_deref(),
            self.non_dropping_particle.as_deref(),
            self.family.as_deref(),
        ];
        let mut name = parts.iter().flatten().cloned().collect::<Vec<_>>().join(" ");
        if let Some(suffix) = &self.suffix {
            name = format!("{} {}", name, suffix);
        }
        name
    }

    /// Inverted order for the first name in a bibliography ("van Gogh, Vincent")
    pub fn inverted(&self) -> String {
        if self.literal.is_some() || self.given.is_none() || self.family.is_none() {
            return self.display();
        }
        let given = [self.given.as_deref(), self.dropping_particle.as_deref()]
            .iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        let mut name = format!("{}, {}", self.short(), given);
        if let Some(suffix) = &self.suffix {
            name = format!("{}, {}", name, suffix);
        }
        name
    }

    /// Key used when sorting bibliography entries
    pub fn sort_key(&self) -> String {
        self.literal
            .as_deref()
            .or(self.family.as_deref())
            .or(self.given.as_deref())
            .unwrap_or("")
            .to_lowercase()
    }
}

/// A CSL date: `date-parts`, or a literal/raw string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateValue {
    Parts(Vec<Vec<i64>>),
    Literal(String),
}

impl DateValue {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let Value::Object(map) = value else {
            return Err(format!("date is not an object: {}", value));
        };

        if let Some(parts) = map.get("date-parts") {
            return parse_date_parts(parts).map(Self::Parts);
        }
        for key in ["literal", "raw"] {
            if let Some(text) = map.get(key) {
                return match text {
                    Value::String(s) => Ok(Self::Literal(s.trim().to_string())),
                    other => Err(format!("`{}` is not a string: {}", key, other)),
                };
            }
        }
        Err("date has neither date-parts, literal nor raw".to_string())
    }

    /// The (first) year, if the date carries one
    pub fn year(&self) -> Option<i64> {
        match self {
            Self::Parts(parts) => parts.first().and_then(|p| p.first()).copied(),
            Self::Literal(text) => {
                let digits: String = text
                    .chars()
                    .skip_while(|c| !c.is_ascii_digit())
                    .take_while(char::is_ascii_digit)
                    .collect();
                (digits.len() == 4).then(|| digits.parse().ok()).flatten()
            }
        }
    }

    /// How the date renders in an author-date citation
    pub fn short_form(&self) -> Option<String> {
        match self {
            Self::Parts(_) => self.year().map(|y| y.to_string()),
            Self::Literal(text) if text.is_empty() => None,
            Self::Literal(text) => Some(self.year().map_or_else(|| text.clone(), |y| y.to_string())),
        }
    }
}

fn parse_date_parts(value: &Value) -> std::result::Result<Vec<Vec<i64>>, String> {
    let Value::Array(ranges) = value else {
        return Err("date-parts is not an array".to_string());
    };
    if ranges.is_empty() {
        return Err("date-parts is empty".to_string());
    }

    ranges
        .iter()
        .map(|range| {
            let Value::Array(parts) = range else {
                return Err(format!("date-parts entry is not an array: {}", range));
            };
            parts
                .iter()
                .map(|part| match part {
                    Value::Number(n) => n
                        .as_i64()
                        .ok_or_else(|| format!("date part is not an integer: {}", n)),
                    Value::String(s) => s
                        .trim()
                        .parse()
                        .map_err(|_| format!("date part is not numeric: {:?}", s)),
                    other => Err(format!("date part is not a number: {}", other)),
                })
                .collect()
        })
        .collect()
}
