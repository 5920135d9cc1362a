//! Structural contracts for capability output.
//!
//! Capability output is untrusted text. [`parse_candidate`] turns it into a
//! JSON value when it can, and [`StructuralContract::validate`] checks that
//! value field by field. Neither ever fails loudly: a malformed answer is
//! just a list of messages for the retry controller.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BatchError;

/// Message reported when the raw output is not JSON at all.
pub const PARSE_ERROR: &str = "could not parse output";

/// Primitive JSON shape a field may be required to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl ValueKind {
    /// The most specific kind describing `value`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Integer,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            ValueKind::Number => value.is_number(),
            other => ValueKind::of(value) == other,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Integer => "integer",
            ValueKind::Boolean => "boolean",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Null => "null",
        };
        write!(f, "{s}")
    }
}

/// A predicate on a single field's value.
///
/// In TOML: `{ rule = "kind", kind = "string" }`, `{ rule = "range", min = 0, max = 10 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    Kind {
        kind: ValueKind,
    },
    OneOf {
        values: Vec<Value>,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Character count for strings, element count for arrays, key count for objects.
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    NotEmpty,
    /// Applies the inner rule to every element of an array.
    Each {
        each: Box<FieldRule>,
    },
}

impl FieldRule {
    pub fn kind(kind: ValueKind) -> Self {
        FieldRule::Kind { kind }
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        FieldRule::OneOf {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        FieldRule::Range { min, max }
    }

    pub fn each(rule: FieldRule) -> Self {
        FieldRule::Each {
            each: Box::new(rule),
        }
    }

    fn check_definition(&self, field: &str) -> Result<(), BatchError> {
        match self {
            FieldRule::OneOf { values } if values.is_empty() => Err(BatchError::Config(format!(
                "field '{field}': one_of needs at least one value"
            ))),
            FieldRule::Range { min, max } => {
                if min.is_some_and(f64::is_nan) || max.is_some_and(f64::is_nan) {
                    return Err(BatchError::Config(format!(
                        "field '{field}': range bounds must be numbers"
                    )));
                }
                match (min, max) {
                    (Some(lo), Some(hi)) if lo > hi => Err(BatchError::Config(format!(
                        "field '{field}': range min {lo} is greater than max {hi}"
                    ))),
                    _ => Ok(()),
                }
            }
            FieldRule::Length {
                min: Some(lo),
                max: Some(hi),
            } if lo > hi => Err(BatchError::Config(format!(
                "field '{field}': length min {lo} is greater than max {hi}"
            ))),
            FieldRule::Each { each } => each.check_definition(field),
            _ => Ok(()),
        }
    }

    fn apply(&self, path: &str, value: &Value, errors: &mut Vec<String>) {
        match self {
            FieldRule::Kind { kind } => {
                if !kind.matches(value) {
                    errors.push(format!(
                        "field '{path}' must be {}, got {}",
                        with_article(*kind),
                        ValueKind::of(value)
                    ));
                }
            }
            FieldRule::OneOf { values } => {
                if !values.contains(value) {
                    let allowed = values
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    errors.push(format!("field '{path}' must be one of [{allowed}]"));
                }
            }
            FieldRule::Range { min, max } => {
                let Some(n) = value.as_f64() else {
                    errors.push(format!("field '{path}' must be a number to check its range"));
                    return;
                };
                if let Some(lo) = min
                    && n < *lo
                {
                    errors.push(format!("field '{path}' must be >= {lo}"));
                }
                if let Some(hi) = max
                    && n > *hi
                {
                    errors.push(format!("field '{path}' must be <= {hi}"));
                }
            }
            FieldRule::Length { min, max } => {
                let len = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.len(),
                    other => {
                        errors.push(format!(
                            "field '{path}' has no length ({})",
                            ValueKind::of(other)
                        ));
                        return;
                    }
                };
                if let Some(lo) = min
                    && len < *lo
                {
                    errors.push(format!("field '{path}' must have length >= {lo}, got {len}"));
                }
                if let Some(hi) = max
                    && len > *hi
                {
                    errors.push(format!("field '{path}' must have length <= {hi}, got {len}"));
                }
            }
            FieldRule::NotEmpty => {
                let empty = match value {
                    Value::Null => true,
                    Value::String(s) => s.trim().is_empty(),
                    Value::Array(a) => a.is_empty(),
                    Value::Object(o) => o.is_empty(),
                    _ => false,
                };
                if empty {
                    errors.push(format!("field '{path}' must not be empty"));
                }
            }
            FieldRule::Each { each } => match value {
                Value::Array(elements) => {
                    for (i, element) in elements.iter().enumerate() {
                        each.apply(&format!("{path}[{i}]"), element, errors);
                    }
                }
                other => errors.push(format!(
                    "field '{path}' must be an array, got {}",
                    ValueKind::of(other)
                )),
            },
        }
    }
}

fn with_article(kind: ValueKind) -> String {
    match kind {
        ValueKind::Array | ValueKind::Integer | ValueKind::Object => format!("an {kind}"),
        ValueKind::Null => kind.to_string(),
        _ => format!("a {kind}"),
    }
}

/// One named field in a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub rules: Vec<FieldRule>,
}

/// The shape a valid capability result must have.
///
/// Fields are checked in declaration order so error lists are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralContract {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl StructuralContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, rules: Vec<FieldRule>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            required: true,
            rules,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, rules: Vec<FieldRule>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            required: false,
            rules,
        });
        self
    }

    /// Names of the required fields, in declaration order.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }

    /// Reject contracts that could never be satisfied or are ambiguous.
    pub fn check(&self) -> Result<(), BatchError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(BatchError::Config("schema field name must not be empty".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(BatchError::Config(format!(
                    "schema declares field '{}' more than once",
                    field.name
                )));
            }
            for rule in &field.rules {
                rule.check_definition(&field.name)?;
            }
        }
        Ok(())
    }

    /// Check a candidate. `None` stands for output that could not be parsed.
    ///
    /// On rejection the returned list is never empty.
    pub fn validate(&self, candidate: Option<&Value>) -> Result<(), Vec<String>> {
        let Some(candidate) = candidate else {
            return Err(vec![PARSE_ERROR.to_string()]);
        };
        let Some(object) = candidate.as_object() else {
            return Err(vec![format!(
                "expected a JSON object, got {}",
                ValueKind::of(candidate)
            )]);
        };

        let mut errors = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                Some(value) => {
                    for rule in &field.rules {
                        rule.apply(&field.name, value, &mut errors);
                    }
                }
                None if field.required => {
                    errors.push(format!("missing required field '{}'", field.name));
                }
                None => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Best-effort extraction of a JSON value from raw capability output.
///
/// Tries the whole text, then the first fenced code block, then the span
/// between the first `{` and the last `}`.
pub fn parse_candidate(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    if let Some(body) = fenced_block(trimmed)
        && let Ok(value) = serde_json::from_str(body.trim())
    {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if start < end {
        serde_json::from_str(&trimmed[start..=end]).ok()
    } else {
        None
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the language tag, if any.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn review_contract() -> StructuralContract {
        StructuralContract::new()
            .required(
                "title",
                vec![FieldRule::kind(ValueKind::String), FieldRule::NotEmpty],
            )
            .required(
                "severity",
                vec![FieldRule::one_of(["low", "medium", "high"])],
            )
            .required(
                "score",
                vec![
                    FieldRule::kind(ValueKind::Number),
                    FieldRule::range(Some(0.0), Some(10.0)),
                ],
            )
            .optional(
                "tags",
                vec![FieldRule::each(FieldRule::kind(ValueKind::String))],
            )
    }

    #[test]
    fn accepts_conforming_object() {
        let value = json!({"title": "Race in cache", "severity": "high", "score": 7.5, "extra": 1});
        assert_eq!(review_contract().validate(Some(&value)), Ok(()));
    }

    #[test]
    fn missing_candidate_is_single_parse_error() {
        assert_eq!(
            review_contract().validate(None),
            Err(vec!["could not parse output".to_string()])
        );
    }

    #[test]
    fn non_object_candidate_is_single_error() {
        let errors = review_contract().validate(Some(&json!([1, 2]))).unwrap_err();
        assert_eq!(errors, vec!["expected a JSON object, got array"]);
    }

    #[test]
    fn reports_every_field_in_declaration_order() {
        let value = json!({"title": "  ", "score": 11, "tags": ["a", 3]});
        let errors = review_contract().validate(Some(&value)).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "field 'title' must not be empty",
                "missing required field 'severity'",
                "field 'score' must be <= 10",
                "field 'tags[1]' must be a string, got integer",
            ]
        );
    }

    #[test]
    fn kind_mismatch_message() {
        let contract =
            StructuralContract::new().required("count", vec![FieldRule::kind(ValueKind::Integer)]);
        let errors = contract.validate(Some(&json!({"count": 1.5}))).unwrap_err();
        assert_eq!(errors, vec!["field 'count' must be an integer, got number"]);
        assert!(contract.validate(Some(&json!({"count": 3}))).is_ok());
    }

    #[test]
    fn number_kind_accepts_integers() {
        assert!(ValueKind::Number.matches(&json!(3)));
        assert!(ValueKind::Number.matches(&json!(3.25)));
        assert!(!ValueKind::Integer.matches(&json!(3.25)));
    }

    #[test]
    fn one_of_lists_allowed_values() {
        let errors = review_contract()
            .validate(Some(&json!({"title": "x", "severity": "urgent", "score": 1})))
            .unwrap_err();
        assert_eq!(
            errors,
            vec![r#"field 'severity' must be one of ["low", "medium", "high"]"#]
        );
    }

    #[test]
    fn length_bounds() {
        let contract = StructuralContract::new().required(
            "summary",
            vec![FieldRule::Length {
                min: Some(3),
                max: Some(5),
            }],
        );
        assert!(contract.validate(Some(&json!({"summary": "abcd"}))).is_ok());
        assert_eq!(
            contract.validate(Some(&json!({"summary": "ab"}))).unwrap_err(),
            vec!["field 'summary' must have length >= 3, got 2"]
        );
        assert_eq!(
            contract.validate(Some(&json!({"summary": 12}))).unwrap_err(),
            vec!["field 'summary' has no length (integer)"]
        );
    }

    #[test]
    fn optional_field_checked_only_when_present() {
        let contract = review_contract();
        let base = json!({"title": "t", "severity": "low", "score": 0});
        assert!(contract.validate(Some(&base)).is_ok());

        let bad = json!({"title": "t", "severity": "low", "score": 0, "tags": "nope"});
        assert_eq!(
            contract.validate(Some(&bad)).unwrap_err(),
            vec!["field 'tags' must be an array, got string"]
        );
    }

    #[test]
    fn empty_contract_accepts_any_object() {
        assert!(StructuralContract::new().validate(Some(&json!({}))).is_ok());
        assert!(StructuralContract::new().validate(Some(&json!("x"))).is_err());
    }

    #[test]
    fn check_rejects_malformed_contracts() {
        let dup = StructuralContract::new()
            .required("a", vec![])
            .optional("a", vec![]);
        assert!(matches!(dup.check(), Err(BatchError::Config(_))));

        let unnamed = StructuralContract::new().required(" ", vec![]);
        assert!(matches!(unnamed.check(), Err(BatchError::Config(_))));

        let inverted =
            StructuralContract::new().required("a", vec![FieldRule::range(Some(5.0), Some(1.0))]);
        assert!(matches!(inverted.check(), Err(BatchError::Config(_))));

        let empty_enum = StructuralContract::new().required(
            "a",
            vec![FieldRule::each(FieldRule::OneOf { values: vec![] })],
        );
        assert!(matches!(empty_enum.check(), Err(BatchError::Config(_))));

        assert!(review_contract().check().is_ok());
    }

    #[test]
    fn contract_deserializes_from_toml() {
        let toml_str = r#"
            [[fields]]
            name = "title"
            required = true
            rules = [{ rule = "kind", kind = "string" }, { rule = "not_empty" }]

            [[fields]]
            name = "score"
            rules = [{ rule = "range", min = 0.0, max = 1.0 }]

            [[fields]]
            name = "labels"
            rules = [{ rule = "each", each = { rule = "one_of", values = ["bug", "perf"] } }]
        "#;
        let contract: StructuralContract = toml::from_str(toml_str).unwrap();
        assert_eq!(contract.fields.len(), 3);
        assert_eq!(contract.required_fields().collect::<Vec<_>>(), vec!["title"]);
        assert_eq!(
            contract.fields[1].rules,
            vec![FieldRule::range(Some(0.0), Some(1.0))]
        );
        assert_eq!(
            contract.fields[2].rules,
            vec![FieldRule::each(FieldRule::one_of(["bug", "perf"]))]
        );
    }

    #[test]
    fn parse_plain_json() {
        assert_eq!(parse_candidate(r#"  {"a": 1} "#), Some(json!({"a": 1})));
    }

    #[test]
    fn parse_fenced_json() {
        let raw = "Here you go:\n```json\n{\"a\": [1, 2]}\n```\nAnything else?";
        assert_eq!(parse_candidate(raw), Some(json!({"a": [1, 2]})));
    }

    #[test]
    fn parse_object_embedded_in_prose() {
        let raw = "Sure! The answer is {\"ok\": true} as requested.";
        assert_eq!(parse_candidate(raw), Some(json!({"ok": true})));
    }

    #[test]
    fn parse_garbage_yields_none() {
        assert_eq!(parse_candidate(""), None);
        assert_eq!(parse_candidate("not valid json at all"), None);
        assert_eq!(parse_candidate("} backwards {"), None);
        assert_eq!(parse_candidate("{\"unterminated\": "), None);
    }
}
