//! Field whitelists shared by the create and PATCH endpoints.
//!
//! Every writable column is described by a [`Field`]. Request bodies are
//! checked against a slice of fields: keys that are not listed are rejected,
//! listed keys are validated and normalized (text is trimmed, blank nullable
//! text becomes `NULL`).

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::FieldErrors;

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    Text { min: usize, max: usize, nullable: bool },
    OneOf(&'static [&'static str]),
    /// Nullable https URL.
    HttpsUrl { max: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub rule: Rule,
    /// Must be present when a record is created.
    pub required: bool,
}

impl Field {
    pub const fn new(name: &'static str, rule: Rule) -> Self {
        Self { name, rule, required: false }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A validated, normalized column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clean {
    Null,
    Text(String),
}

impl Clean {
    pub fn into_option(self) -> Option<String> {
        match self {
            Clean::Null => None,
            Clean::Text(s) => Some(s),
        }
    }
}

lazy_static! {
    static ref HTTPS_URL_RE: Regex = Regex::new(r"^https://[^\s/$.?#][^\s]*$").unwrap();
}

impl Rule {
    pub fn check(&self, value: &Value) -> Result<Clean, String> {
        match (self, value) {
            (Rule::Text { nullable: true, .. }, Value::Null) => Ok(Clean::Null),
            (Rule::Text { .. }, Value::Null) => Err("is required".into()),
            (Rule::Text { min, max, nullable }, Value::String(raw)) => {
                let s = raw.trim();
                if s.is_empty() && *nullable {
                    return Ok(Clean::Null);
                }
                let len = s.chars().count();
                if len < *min {
                    return Err(if *min == 1 {
                        "must not be empty".into()
                    } else {
                        format!("must be at least {} characters", min)
                    });
                }
                if len > *max {
                    return Err(format!("must be at most {} characters", max));
                }
                Ok(Clean::Text(s.to_string()))
            }
            (Rule::Text { .. }, _) => Err("must be a string".into()),

            (Rule::OneOf(allowed), Value::String(raw)) if allowed.iter().any(|a| *a == raw.as_str()) => {
                Ok(Clean::Text(raw.clone()))
            }
            (Rule::OneOf(allowed), _) => Err(format!("must be one of: {}", allowed.join(", "))),

            (Rule::HttpsUrl { .. }, Value::Null) => Ok(Clean::Null),
            (Rule::HttpsUrl { max }, Value::String(raw)) => {
                let s = raw.trim();
                if s.is_empty() {
                    return Ok(Clean::Null);
                }
                if s.chars().count() > *max {
                    return Err(format!("must be at most {} characters", max));
                }
                if !HTTPS_URL_RE.is_match(s) {
                    return Err("must be an https URL".into());
                }
                Ok(Clean::Text(s.to_string()))
            }
            (Rule::HttpsUrl { .. }, _) => Err("must be a string".into()),
        }
    }
}

/// Values that passed validation, ordered by field name (`serde_json::Map`
/// iterates its keys sorted).
#[derive(Debug, Default)]
pub struct Validated {
    values: Vec<(&'static str, Clean)>,
}

impl Validated {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, Clean)> {
        self.values.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Clean> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Text value of `name`; `None` when absent or null.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).cloned().and_then(Clean::into_option)
    }
}

/// Validates a PATCH-style body: every key must be whitelisted, absent
/// fields are left alone. All problems are reported at once.
pub fn validate_patch(fields: &[Field], body: &Map<String, Value>) -> Result<Validated, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut out = Validated::default();

    for (key, value) in body {
        let Some(field) = fields.iter().find(|f| f.name == key.as_str()) else {
            errors.insert(key.clone(), "is not an updatable field".into());
            continue;
        };
        match field.rule.check(value) {
            Ok(clean) => out.values.push((field.name, clean)),
            Err(reason) => {
                errors.insert(key.clone(), reason);
            }
        }
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

/// Validates a create body: like [`validate_patch`], plus required fields
/// must be present and non-null.
pub fn validate_create(fields: &[Field], body: &Map<String, Value>) -> Result<Validated, FieldErrors> {
    let mut errors = match validate_patch(fields, body) {
        Ok(v) => {
            let missing = missing_required(fields, &v);
            if missing.is_empty() {
                return Ok(v);
            }
            missing
        }
        Err(errors) => errors,
    };
    for f in fields.iter().filter(|f| f.required) {
        if matches!(body.get(f.name), None | Some(Value::Null)) {
            errors.insert(f.name.to_string(), "is required".into());
        }
    }
    Err(errors)
}

fn missing_required(fields: &[Field], v: &Validated) -> FieldErrors {
    fields
        .iter()
        .filter(|f| f.required && matches!(v.get(f.name), None | Some(Clean::Null)))
        .map(|f| (f.name.to_string(), "is required".to_string()))
        .collect()
}
