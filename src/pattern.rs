//! Parametric filename patterns
//!
//! A filename pattern is an ordered sequence of literal fragments and typed
//! capture specifiers. Compilation produces an anchored regex plus a
//! capture-name to (primitive, target-column) mapping; matching a basename
//! yields the target concept together with parsed, type-checked values.

use regex::Regex;
use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::types::{Primitive, TypeTable};

/// A typed capture inside a filename pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpec {
    pub name: String,
    pub primitive: Primitive,
    /// Target column on the concept; defaults to the capture name
    pub column: Option<String>,
}

impl CaptureSpec {
    pub fn target_column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// One fragment of a filename pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternPart {
    Literal(String),
    Capture(CaptureSpec),
}

/// A compiled filename pattern mapping file basenames to a concept
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    pub name: String,
    /// Target concept as (domain, concept)
    pub concept: (String, String),
    pub parts: Vec<PatternPart>,
    regex: Regex,
    captures: Vec<CaptureSpec>,
}

/// One successful match of a pattern against a file basename
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub pattern: String,
    pub concept: (String, String),
    /// Target-column name to parsed, type-checked value
    pub mapped: HashMap<String, serde_json::Value>,
    /// Capture name to raw extracted string
    pub extracted: HashMap<String, String>,
}

impl FilenamePattern {
    /// Compile a pattern from its fragment sequence
    pub fn compile(
        name: impl Into<String>,
        concept: (String, String),
        parts: Vec<PatternPart>,
    ) -> Result<Self> {
        let name = name.into();
        let mut source = String::from("^");
        let mut captures = Vec::new();
        for part in &parts {
            match part {
                PatternPart::Literal(text) => source.push_str(&regex::escape(text)),
                PatternPart::Capture(spec) => {
                    if !spec
                        .name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
                        || spec.name.is_empty()
                    {
                        return Err(ModelError::PatternInvalid {
                            name: name.clone(),
                            message: format!("invalid capture name '{}'", spec.name),
                        });
                    }
                    if captures.iter().any(|c: &CaptureSpec| c.name == spec.name) {
                        return Err(ModelError::PatternInvalid {
                            name: name.clone(),
                            message: format!("duplicate capture name '{}'", spec.name),
                        });
                    }
                    source.push_str(&format!(
                        "(?P<{}>{})",
                        spec.name,
                        spec.primitive.capture_subpattern()
                    ));
                    captures.push(spec.clone());
                }
            }
        }
        source.push('$');
        let regex = Regex::new(&source).map_err(|e| ModelError::PatternInvalid {
            name: name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name,
            concept,
            parts,
            regex,
            captures,
        })
    }

    /// Capture specs in pattern order
    pub fn captures(&self) -> &[CaptureSpec] {
        &self.captures
    }

    /// The compiled regex source
    pub fn regex_source(&self) -> &str {
        self.regex.as_str()
    }

    /// Match a file basename; None when the regex does not match or a
    /// captured value fails its type check
    pub fn match_basename(&self, basename: &str, types: &TypeTable) -> Option<PatternMatch> {
        let caps = self.regex.captures(basename)?;
        let mut mapped = HashMap::new();
        let mut extracted = HashMap::new();
        for spec in &self.captures {
            let raw = caps.name(&spec.name)?.as_str();
            if !types.is_valid(spec.primitive, raw) {
                return None;
            }
            let value = parse_value(spec.primitive, raw)?;
            extracted.insert(spec.name.clone(), raw.to_string());
            mapped.insert(spec.target_column().to_string(), value);
        }
        Some(PatternMatch {
            pattern: self.name.clone(),
            concept: self.concept.clone(),
            mapped,
            extracted,
        })
    }
}

impl PartialEq for FilenamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.concept == other.concept && self.parts == other.parts
    }
}

/// Parse a raw capture into its typed JSON value
fn parse_value(primitive: Primitive, raw: &str) -> Option<serde_json::Value> {
    use serde_json::Value;
    match primitive {
        Primitive::Integer => raw.parse::<i64>().ok().map(Value::from),
        Primitive::Decimal => raw.parse::<f64>().ok().map(Value::from),
        Primitive::Boolean => Some(Value::from(raw == "true" || raw == "1")),
        _ => Some(Value::from(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pattern() -> FilenamePattern {
        FilenamePattern::compile(
            "sample-file",
            ("s".to_string(), "sample".to_string()),
            vec![
                PatternPart::Literal("sample_".to_string()),
                PatternPart::Capture(CaptureSpec {
                    name: "id".to_string(),
                    primitive: Primitive::String,
                    column: None,
                }),
                PatternPart::Literal("_r".to_string()),
                PatternPart::Capture(CaptureSpec {
                    name: "replicate".to_string(),
                    primitive: Primitive::Integer,
                    column: Some("rep".to_string()),
                }),
                PatternPart::Literal(".txt".to_string()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_match_extracts_typed_values() {
        let pattern = sample_pattern();
        let types = TypeTable::new();
        let m = pattern.match_basename("sample_ABC_r3.txt", &types).unwrap();

        assert_eq!(m.concept.1, "sample");
        assert_eq!(m.extracted["id"], "ABC");
        assert_eq!(m.extracted["replicate"], "3");
        assert_eq!(m.mapped["id"], serde_json::json!("ABC"));
        assert_eq!(m.mapped["rep"], serde_json::json!(3));
    }

    #[test]
    fn test_no_match() {
        let pattern = sample_pattern();
        let types = TypeTable::new();
        assert!(pattern.match_basename("other_ABC_r3.txt", &types).is_none());
        assert!(pattern.match_basename("sample_ABC_rX.txt", &types).is_none());
    }

    #[test]
    fn test_literal_metacharacters_escaped() {
        let pattern = FilenamePattern::compile(
            "dotted",
            ("d".to_string(), "c".to_string()),
            vec![PatternPart::Literal("a.b".to_string())],
        )
        .unwrap();
        let types = TypeTable::new();
        assert!(pattern.match_basename("a.b", &types).is_some());
        assert!(pattern.match_basename("aXb", &types).is_none());
    }

    #[test]
    fn test_duplicate_capture_rejected() {
        let err = FilenamePattern::compile(
            "dup",
            ("d".to_string(), "c".to_string()),
            vec![
                PatternPart::Capture(CaptureSpec {
                    name: "x".to_string(),
                    primitive: Primitive::String,
                    column: None,
                }),
                PatternPart::Literal("_".to_string()),
                PatternPart::Capture(CaptureSpec {
                    name: "x".to_string(),
                    primitive: Primitive::String,
                    column: None,
                }),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::PatternInvalid { .. }));
    }
}
