//! Rule evaluation
//!
//! Errors accumulate across attributes and across independent rules of the
//! same attribute. The composite rules `foreign_int` and `foreign_str` are
//! different: they stop at their first failing sub-rule and report only that
//! sub-rule's message.

use regex::Regex;
use sea_orm::DbErr;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

use super::ValidationResult;
use super::exists::ExistsChecker;
use super::rules::{Rule, RuleDescriptor, parse};
use crate::template::render;

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\s*$").expect("numeric pattern")
});
static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[+-]?\d+\s*$").expect("integer pattern"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern")
});

const INVALID_RULE: &str = "The :attribute field has an invalid validation rule ':rule'.";

/// Rules that run even when the attribute is absent or blank.
const IMPLICIT_RULES: &[&str] = &["required", "present", "filled"];

/// Rules that make `min`, `max`, `size` and `between` compare numerically.
const NUMERIC_RULES: &[&str] = &["numeric", "integer", "foreign_int"];

/// Markers that change how an attribute is validated but never fail.
const MARKER_RULES: &[&str] = &["bail", "nullable", "sometimes"];

/// Attribute rules in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    attributes: Vec<(String, RuleDescriptor)>,
}

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`RuleSet::insert`].
    #[must_use]
    pub fn rule(mut self, attribute: impl Into<String>, rule_string: &str) -> Self {
        self.insert(attribute, rule_string);
        self
    }

    /// Parses and stores the rules of `attribute`, replacing earlier ones.
    pub fn insert(&mut self, attribute: impl Into<String>, rule_string: &str) {
        let attribute = attribute.into();
        let descriptor = parse(rule_string);
        match self.attributes.iter_mut().find(|(name, _)| *name == attribute) {
            Some((_, existing)) => *existing = descriptor,
            None => self.attributes.push((attribute, descriptor)),
        }
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&RuleDescriptor> {
        self.attributes
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuleDescriptor)> {
        self.attributes
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Copy without the rules of `attributes`.
    #[must_use]
    pub fn without(&self, attributes: &[&str]) -> Self {
        Self {
            attributes: self
                .attributes
                .iter()
                .filter(|(name, _)| !attributes.contains(&name.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// First parameter of the attribute's `max` rule, else of its `size` rule.
    #[must_use]
    pub fn attribute_max_value(&self, attribute: &str) -> Option<&str> {
        let descriptor = self.get(attribute)?;
        descriptor
            .get("max")
            .or_else(|| descriptor.get("size"))
            .and_then(|rule| rule.param(0))
    }
}

/// Outcome of one constraint.
enum Check {
    Pass,
    Fail,
    Invalid,
}

impl From<bool> for Check {
    fn from(passed: bool) -> Self {
        if passed { Check::Pass } else { Check::Fail }
    }
}

#[derive(Clone, Copy)]
enum SizeKind {
    Numeric,
    String,
    Array,
}

impl SizeKind {
    fn suffix(self) -> &'static str {
        match self {
            SizeKind::Numeric => "numeric",
            SizeKind::String => "string",
            SizeKind::Array => "array",
        }
    }
}

/// What the engine needs to know about the attribute under evaluation.
struct Subject<'a> {
    attribute: &'a str,
    value: Option<&'a Value>,
    data: &'a Map<String, Value>,
    numeric: bool,
}

/// Evaluates [`RuleSet`]s against a data bag.
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    messages: HashMap<String, String>,
}

impl ValidationEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom messages keyed `attribute.rule` or `rule`.
    #[must_use]
    pub fn with_messages(messages: HashMap<String, String>) -> Self {
        Self { messages }
    }

    /// Validates `data` against `rules`.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` only when an `exists` lookup cannot be performed;
    /// failing constraints are reported in the returned result.
    pub async fn validate(
        &self,
        data: &Map<String, Value>,
        rules: &RuleSet,
        checker: &dyn ExistsChecker,
    ) -> Result<ValidationResult, DbErr> {
        let mut result = ValidationResult::new();

        for (attribute, descriptor) in rules.iter() {
            let subject = Subject {
                attribute,
                value: data.get(attribute),
                data,
                numeric: NUMERIC_RULES.iter().any(|name| descriptor.has(name)),
            };
            let bail = descriptor.has("bail");
            let nullable = descriptor.has("nullable");

            for rule in descriptor {
                if MARKER_RULES.contains(&rule.name.as_str()) {
                    continue;
                }
                if !IMPLICIT_RULES.contains(&rule.name.as_str())
                    && !is_validatable(subject.value, nullable)
                {
                    continue;
                }

                if let Some(message) = self.evaluate(&subject, rule, checker).await? {
                    result.add(attribute, message);
                    if bail {
                        break;
                    }
                }
            }
        }

        if result.fails() {
            tracing::debug!(fields = result.len(), "validation failed");
        }
        Ok(result)
    }

    /// Runs one declared rule, expanding composites, and returns the failure
    /// message if it did not pass.
    async fn evaluate(
        &self,
        subject: &Subject<'_>,
        rule: &Rule,
        checker: &dyn ExistsChecker,
    ) -> Result<Option<String>, DbErr> {
        let sub_rules = match rule.name.as_str() {
            "foreign_int" => match (rule.param(0), rule.param(1)) {
                (Some(table), Some(column)) => vec![
                    Rule::new("integer", vec![]),
                    Rule::new("min", vec!["1".into()]),
                    Rule::new("max_digits", vec!["10".into()]),
                    Rule::new("exists", vec![table.into(), column.into()]),
                ],
                _ => return Ok(Some(self.invalid_message(subject, rule))),
            },
            "foreign_str" => match (rule.param(0), rule.param(1), rule.param(2)) {
                (Some(length), Some(table), Some(column)) => vec![
                    Rule::new("between", vec!["1".into(), length.into()]),
                    Rule::new("exists", vec![table.into(), column.into()]),
                ],
                _ => return Ok(Some(self.invalid_message(subject, rule))),
            },
            _ => return self.check_one(subject, rule, checker).await,
        };

        for sub_rule in &sub_rules {
            if let Some(message) = self.check_one(subject, sub_rule, checker).await? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    async fn check_one(
        &self,
        subject: &Subject<'_>,
        rule: &Rule,
        checker: &dyn ExistsChecker,
    ) -> Result<Option<String>, DbErr> {
        Ok(match passes(subject, rule, checker).await? {
            Check::Pass => None,
            Check::Fail => Some(self.failure_message(subject, rule)),
            Check::Invalid => Some(self.invalid_message(subject, rule)),
        })
    }

    fn failure_message(&self, subject: &Subject<'_>, rule: &Rule) -> String {
        let name = rule.name.as_str();
        let template = self
            .messages
            .get(&format!("{}.{name}", subject.attribute))
            .or_else(|| self.messages.get(name))
            .map_or_else(|| default_message(name, size_kind(subject)), String::as_str);

        render(template, &replacements(subject.attribute, rule))
    }

    fn invalid_message(&self, subject: &Subject<'_>, rule: &Rule) -> String {
        tracing::warn!(
            attribute = subject.attribute,
            rule = %rule,
            "invalid validation rule"
        );
        render(
            INVALID_RULE,
            &[
                ("attribute", display_name(subject.attribute)),
                ("rule", rule.name.clone()),
            ],
        )
    }
}

async fn passes(
    subject: &Subject<'_>,
    rule: &Rule,
    checker: &dyn ExistsChecker,
) -> Result<Check, DbErr> {
    let value = subject.value;
    let check = match rule.name.as_str() {
        "required" => value.is_some_and(|v| !is_blank(v)).into(),
        "present" => subject.data.contains_key(subject.attribute).into(),
        "filled" => value.is_none_or(|v| !is_blank(v)).into(),
        "string" => matches!(value, Some(Value::String(_))).into(),
        "integer" => value.is_some_and(is_integer).into(),
        "numeric" => value.is_some_and(is_numeric).into(),
        "boolean" => value.is_some_and(is_boolean).into(),
        "array" => matches!(value, Some(Value::Array(_) | Value::Object(_))).into(),
        "email" => value.is_some_and(|v| EMAIL.is_match(&as_text(v))).into(),
        "alpha" => text_matches(value, char::is_alphabetic).into(),
        "alpha_num" => text_matches(value, char::is_alphanumeric).into(),
        "alpha_dash" => {
            text_matches(value, |c| c.is_alphanumeric() || c == '-' || c == '_').into()
        }
        "regex" => match rule.param(0).filter(|raw| !raw.is_empty()).and_then(compile_pattern) {
            Some(pattern) => value.is_some_and(|v| pattern.is_match(&as_text(v))).into(),
            None => Check::Invalid,
        },
        "min" | "max" | "size" => match (rule.param(0).and_then(parse_number), value) {
            (Some(bound), Some(v)) => {
                let size = size_of(v, subject.numeric);
                match rule.name.as_str() {
                    "min" => size >= bound,
                    "max" => size <= bound,
                    _ => (size - bound).abs() < f64::EPSILON,
                }
                .into()
            }
            (Some(_), None) => Check::Fail,
            (None, _) => Check::Invalid,
        },
        "between" => match (
            rule.param(0).and_then(parse_number),
            rule.param(1).and_then(parse_number),
        ) {
            (Some(min), Some(max)) => value
                .is_some_and(|v| {
                    let size = size_of(v, subject.numeric);
                    size >= min && size <= max
                })
                .into(),
            _ => Check::Invalid,
        },
        "digits" => match rule.param(0).and_then(|p| p.parse::<usize>().ok()) {
            Some(length) => value
                .is_some_and(|v| {
                    let text = as_text(v);
                    text.chars().all(|c| c.is_ascii_digit()) && text.len() == length
                })
                .into(),
            None => Check::Invalid,
        },
        "max_digits" | "min_digits" => match rule.param(0).and_then(|p| p.parse::<usize>().ok()) {
            Some(limit) => value
                .is_some_and(|v| {
                    let length = as_text(v).len();
                    is_numeric(v)
                        && if rule.name == "max_digits" {
                            length <= limit
                        } else {
                            length >= limit
                        }
                })
                .into(),
            None => Check::Invalid,
        },
        "max_decimal" | "min_decimal" => match rule.param(0).and_then(|p| p.parse::<usize>().ok()) {
            Some(limit) => value
                .and_then(|v| whole_digits(&as_text(v)))
                .is_some_and(|whole| {
                    if rule.name == "max_decimal" {
                        whole <= limit
                    } else {
                        whole >= limit
                    }
                })
                .into(),
            None => Check::Invalid,
        },
        "in" | "not_in" => {
            let found = value.is_some_and(|v| {
                let text = as_text(v);
                rule.parameters.iter().any(|candidate| *candidate == text)
            });
            (if rule.name == "in" { found } else { !found }).into()
        }
        "same" | "different" => match rule.param(0) {
            Some(other) => {
                let equal = subject.data.get(other) == value;
                (if rule.name == "same" { equal } else { !equal }).into()
            }
            None => Check::Invalid,
        },
        "confirmed" => {
            let confirmation = format!("{}_confirmation", subject.attribute);
            (subject.data.get(&confirmation) == value).into()
        }
        "exists" => match rule.param(0) {
            Some(table) => {
                let column = rule.param(1).unwrap_or(subject.attribute);
                match value {
                    Some(v) => checker.exists(table, column, v).await?.into(),
                    None => Check::Fail,
                }
            }
            None => Check::Invalid,
        },
        _ => Check::Invalid,
    };
    Ok(check)
}

fn is_validatable(value: Option<&Value>, nullable: bool) -> bool {
    match value {
        None => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Null) => !nullable,
        Some(_) => true,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => NUMERIC.is_match(s),
        _ => false,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => INTEGER.is_match(s),
        _ => false,
    }
}

fn is_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::Number(n) => n.as_i64().is_some_and(|n| n == 0 || n == 1),
        Value::String(s) => matches!(s.as_str(), "0" | "1"),
        _ => false,
    }
}

fn text_matches(value: Option<&Value>, predicate: impl Fn(char) -> bool) -> bool {
    match value {
        Some(Value::String(s)) => s.chars().all(predicate),
        Some(Value::Number(n)) => n.to_string().chars().all(predicate),
        _ => false,
    }
}

/// String form used by length and pattern rules.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) | Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Digits before the point of a plain decimal such as `12.50`; `None` when
/// `text` is not one.
fn whole_digits(text: &str) -> Option<usize> {
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };
    let fraction_ok = fraction.is_none_or(|fraction| !fraction.is_empty() && all_digits(fraction));
    (all_digits(whole) && fraction_ok).then_some(whole.len())
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

#[allow(clippy::cast_precision_loss)]
fn size_of(value: &Value, numeric: bool) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) if numeric && NUMERIC.is_match(s) => parse_number(s).unwrap_or_default(),
        Value::String(s) => s.chars().count() as f64,
        Value::Array(items) => items.len() as f64,
        Value::Object(map) => map.len() as f64,
        Value::Bool(_) | Value::Null => as_text(value).len() as f64,
    }
}

fn size_kind(subject: &Subject<'_>) -> SizeKind {
    match subject.value {
        Some(Value::Array(_) | Value::Object(_)) => SizeKind::Array,
        Some(Value::Number(_)) => SizeKind::Numeric,
        Some(v) if subject.numeric && is_numeric(v) => SizeKind::Numeric,
        _ => SizeKind::String,
    }
}

/// Accepts both bare patterns and `/pattern/flags` delimited ones.
fn compile_pattern(raw: &str) -> Option<Regex> {
    let pattern = match raw.strip_prefix('/').and_then(|rest| rest.rsplit_once('/')) {
        Some((body, flags)) if flags.contains('i') => format!("(?i){body}"),
        Some((body, _)) => body.to_string(),
        None => raw.to_string(),
    };
    Regex::new(&pattern).ok()
}

fn display_name(attribute: &str) -> String {
    attribute.replace('_', " ")
}

fn replacements(attribute: &str, rule: &Rule) -> Vec<(&'static str, String)> {
    let mut pairs = vec![("attribute", display_name(attribute))];
    let first = rule.param(0).unwrap_or_default().to_string();
    match rule.name.as_str() {
        "min" => pairs.push(("min", first)),
        "max" => pairs.push(("max", first)),
        "size" => pairs.push(("size", first)),
        "between" => {
            pairs.push(("min", first));
            pairs.push(("max", rule.param(1).unwrap_or_default().to_string()));
        }
        "digits" | "max_digits" | "min_digits" => pairs.push(("digits", first)),
        "max_decimal" | "min_decimal" => pairs.push(("whole", first)),
        "in" | "not_in" => pairs.push(("values", rule.parameters.join(", "))),
        "same" | "different" => pairs.push(("other", display_name(&first))),
        _ => {}
    }
    pairs
}

fn default_message(rule: &str, kind: SizeKind) -> &'static str {
    match (rule, kind.suffix()) {
        ("required", _) => "The :attribute field is required.",
        ("present", _) => "The :attribute field must be present.",
        ("filled", _) => "The :attribute field must have a value.",
        ("string", _) => "The :attribute must be a string.",
        ("integer", _) => "The :attribute must be an integer.",
        ("numeric", _) => "The :attribute must be a number.",
        ("boolean", _) => "The :attribute field must be true or false.",
        ("array", _) => "The :attribute must be an array.",
        ("email", _) => "The :attribute must be a valid email address.",
        ("alpha", _) => "The :attribute may only contain letters.",
        ("alpha_num", _) => "The :attribute may only contain letters and numbers.",
        ("alpha_dash", _) => {
            "The :attribute may only contain letters, numbers, dashes and underscores."
        }
        ("regex", _) => "The :attribute format is invalid.",
        ("min", "numeric") => "The :attribute must be at least :min.",
        ("min", "array") => "The :attribute must have at least :min items.",
        ("min", _) => "The :attribute must be at least :min characters.",
        ("max", "numeric") => "The :attribute may not be greater than :max.",
        ("max", "array") => "The :attribute may not have more than :max items.",
        ("max", _) => "The :attribute may not be greater than :max characters.",
        ("between", "numeric") => "The :attribute must be between :min and :max.",
        ("between", "array") => "The :attribute must have between :min and :max items.",
        ("between", _) => "The :attribute must be between :min and :max characters.",
        ("size", "numeric") => "The :attribute must be :size.",
        ("size", "array") => "The :attribute must contain :size items.",
        ("size", _) => "The :attribute must be :size characters.",
        ("digits", _) => "The :attribute must be :digits digits.",
        ("same", _) => "The :attribute and :other must match.",
        ("different", _) => "The :attribute and :other must be different.",
        ("confirmed", _) => "The :attribute confirmation does not match.",
        ("max_decimal", _) => "May not have more than :whole whole number digits",
        ("min_decimal", _) => "Must have more than :whole whole number digits",
        ("max_digits", _) => "Number cannot be greater than :digits",
        ("min_digits", _) => "Number cannot be less than :digits",
        ("in" | "not_in" | "exists", _) => "The selected :attribute is invalid.",
        _ => "The :attribute is invalid.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::StaticLookup;
    use serde_json::json;

    async fn run(data: Value, rules: &RuleSet) -> ValidationResult {
        let lookup = StaticLookup::new()
            .with("users", "id", [json!(1), json!(42)])
            .with("tags", "slug", [json!("rust")]);
        ValidationEngine::new()
            .validate(data.as_object().unwrap(), rules, &lookup)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_max_digits() {
        let rules = RuleSet::new().rule("code", "max_digits:5");
        assert!(run(json!({"code": 12345}), &rules).await.passes());

        let result = run(json!({"code": 123_456}), &rules).await;
        assert_eq!(result.first("code"), Some("Number cannot be greater than 5"));
    }

    #[tokio::test]
    async fn test_min_digits() {
        let rules = RuleSet::new().rule("code", "min_digits:3");
        let result = run(json!({"code": 12}), &rules).await;
        assert_eq!(result.first("code"), Some("Number cannot be less than 3"));
        assert!(run(json!({"code": 123}), &rules).await.passes());
    }

    #[tokio::test]
    async fn test_digit_rules_require_numeric_values() {
        let rules = RuleSet::new().rule("code", "max_digits:5");
        assert!(run(json!({"code": "12a"}), &rules).await.fails());
        assert!(run(json!({"code": "123"}), &rules).await.passes());
    }

    #[tokio::test]
    async fn test_max_decimal_only_limits_whole_part() {
        let rules = RuleSet::new().rule("price", "max_decimal:2");
        assert!(run(json!({"price": 12.345}), &rules).await.passes());
        assert!(run(json!({"price": "12.345"}), &rules).await.passes());

        let result = run(json!({"price": 123.4}), &rules).await;
        assert_eq!(
            result.first("price"),
            Some("May not have more than 2 whole number digits")
        );
    }

    #[tokio::test]
    async fn test_decimal_rules_reject_malformed_numbers() {
        let rules = RuleSet::new().rule("price", "max_decimal:3");
        assert!(run(json!({"price": ".5"}), &rules).await.passes());
        assert!(run(json!({"price": "12."}), &rules).await.fails());
        assert!(run(json!({"price": "1.2.3"}), &rules).await.fails());
        assert!(run(json!({"price": "-12"}), &rules).await.fails());
        assert!(run(json!({"price": "1e3"}), &rules).await.fails());
    }

    #[test]
    fn test_whole_digits() {
        assert_eq!(whole_digits("123.45"), Some(3));
        assert_eq!(whole_digits("7"), Some(1));
        assert_eq!(whole_digits(""), Some(0));
        assert_eq!(whole_digits("12.x"), None);
    }

    #[tokio::test]
    async fn test_regex_pattern_keeps_comma_spacing() {
        let rules = RuleSet::new().rule("pair", "regex:/^a, b$/");
        assert!(run(json!({"pair": "a, b"}), &rules).await.passes());
        assert!(run(json!({"pair": "a,b"}), &rules).await.fails());

        let rules = RuleSet::new().rule("code", r"regex:/^\d{2,3}$/");
        assert!(run(json!({"code": "123"}), &rules).await.passes());
        assert!(run(json!({"code": "1234"}), &rules).await.fails());
    }

    #[tokio::test]
    async fn test_min_decimal() {
        let rules = RuleSet::new().rule("price", "min_decimal:3");
        assert!(run(json!({"price": "123.4"}), &rules).await.passes());
        let result = run(json!({"price": "12.99"}), &rules).await;
        assert_eq!(
            result.first("price"),
            Some("Must have more than 3 whole number digits")
        );
    }

    #[tokio::test]
    async fn test_foreign_int_reports_first_failing_sub_rule_only() {
        let rules = RuleSet::new().rule("owner_id", "foreign_int:users,id");

        let result = run(json!({"owner_id": "abc"}), &rules).await;
        assert_eq!(
            result.get("owner_id").unwrap(),
            ["The owner id must be an integer."]
        );

        let result = run(json!({"owner_id": -5}), &rules).await;
        assert_eq!(
            result.get("owner_id").unwrap(),
            ["The owner id must be at least 1."]
        );

        let result = run(json!({"owner_id": 12_345_678_901_u64}), &rules).await;
        assert_eq!(
            result.get("owner_id").unwrap(),
            ["Number cannot be greater than 10"]
        );

        let result = run(json!({"owner_id": 7}), &rules).await;
        assert_eq!(
            result.get("owner_id").unwrap(),
            ["The selected owner id is invalid."]
        );

        assert!(run(json!({"owner_id": 42}), &rules).await.passes());
    }

    #[tokio::test]
    async fn test_foreign_str() {
        let rules = RuleSet::new().rule("tag", "foreign_str:5,tags,slug");
        assert!(run(json!({"tag": "rust"}), &rules).await.passes());

        let result = run(json!({"tag": "toolong"}), &rules).await;
        assert_eq!(
            result.get("tag").unwrap(),
            ["The tag must be between 1 and 5 characters."]
        );

        let result = run(json!({"tag": "go"}), &rules).await;
        assert_eq!(result.get("tag").unwrap(), ["The selected tag is invalid."]);
    }

    #[tokio::test]
    async fn test_errors_accumulate_across_attributes_and_rules() {
        let rules = RuleSet::new()
            .rule("name", "string|min:5|in:alpha,beta")
            .rule("email", "required|email");
        let result = run(json!({"name": "abc"}), &rules).await;

        assert_eq!(result.len(), 2);
        assert_eq!(
            result.get("name").unwrap(),
            [
                "The name must be at least 5 characters.",
                "The selected name is invalid."
            ]
        );
        assert_eq!(
            result.get("email").unwrap(),
            ["The email field is required."]
        );
    }

    #[tokio::test]
    async fn test_bail_stops_attribute_at_first_failure() {
        let rules = RuleSet::new().rule("name", "bail|string|min:5|in:alpha");
        let result = run(json!({"name": "abc"}), &rules).await;
        assert_eq!(result.get("name").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_absent_values_only_run_implicit_rules() {
        let rules = RuleSet::new()
            .rule("nickname", "string|max:3")
            .rule("title", "string|max:3")
            .rule("note", "nullable|string");
        let result = run(json!({"title": "  ", "note": null}), &rules).await;
        assert!(result.passes());
    }

    #[tokio::test]
    async fn test_null_without_nullable_is_validated() {
        let rules = RuleSet::new().rule("note", "string");
        assert!(run(json!({"note": null}), &rules).await.fails());
    }

    #[tokio::test]
    async fn test_numeric_rules_change_size_semantics() {
        let rules = RuleSet::new().rule("age", "integer|max:120");
        assert!(run(json!({"age": "99"}), &rules).await.passes());
        let result = run(json!({"age": "130"}), &rules).await;
        assert_eq!(
            result.first("age"),
            Some("The age may not be greater than 120.")
        );

        let rules = RuleSet::new().rule("code", "max:3");
        assert!(run(json!({"code": "1300"}), &rules).await.fails());
    }

    #[tokio::test]
    async fn test_unknown_rule_blocks_only_its_field() {
        let rules = RuleSet::new()
            .rule("name", "made_up|required")
            .rule("price", "numeric");
        let result = run(json!({"name": "x", "price": 3}), &rules).await;
        assert_eq!(
            result.get("name").unwrap(),
            ["The name field has an invalid validation rule 'made_up'."]
        );
        assert!(result.get("price").is_none());
    }

    #[tokio::test]
    async fn test_composite_with_missing_parameters_is_invalid() {
        let rules = RuleSet::new().rule("owner_id", "foreign_int:users");
        let result = run(json!({"owner_id": 1}), &rules).await;
        assert_eq!(
            result.first("owner_id"),
            Some("The owner id field has an invalid validation rule 'foreign_int'.")
        );
    }

    #[tokio::test]
    async fn test_custom_messages_override_defaults() {
        let messages = HashMap::from([
            ("required".to_string(), "Need :attribute".to_string()),
            ("email.email".to_string(), "Bad address".to_string()),
        ]);
        let rules = RuleSet::new()
            .rule("name", "required")
            .rule("email", "email");
        let result = ValidationEngine::with_messages(messages)
            .validate(
                json!({"email": "nope"}).as_object().unwrap(),
                &rules,
                &StaticLookup::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.first("name"), Some("Need name"));
        assert_eq!(result.first("email"), Some("Bad address"));
    }

    #[tokio::test]
    async fn test_misc_rules() {
        let rules = RuleSet::new()
            .rule("password", "confirmed")
            .rule("slug", "alpha_dash|regex:/^[a-z-]+$/")
            .rule("flag", "boolean")
            .rule("pin", "digits:4")
            .rule("other", "different:slug");
        let data = json!({
            "password": "secret",
            "password_confirmation": "secret",
            "slug": "my-slug",
            "flag": 1,
            "pin": "0042",
            "other": "x"
        });
        assert!(run(data, &rules).await.passes());
    }

    #[test]
    fn test_attribute_max_value() {
        let rules = RuleSet::new()
            .rule("name", "required|max:20")
            .rule("code", "size:4")
            .rule("note", "string");
        assert_eq!(rules.attribute_max_value("name"), Some("20"));
        assert_eq!(rules.attribute_max_value("code"), Some("4"));
        assert_eq!(rules.attribute_max_value("note"), None);
        assert_eq!(rules.attribute_max_value("missing"), None);
    }
}
