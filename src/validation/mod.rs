//! Validation Support
//!
//! Rule strings are declared per attribute on a model type, parsed once into
//! [`RuleDescriptor`]s and evaluated by the [`ValidationEngine`]. The outcome
//! is a [`ValidationResult`]: every failing field mapped to its messages in
//! the order they were produced.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelkit::validation::{ValidationEngine, RuleSet, StaticLookup};
//! use serde_json::json;
//!
//! let rules = RuleSet::new()
//!     .rule("name", "required|max:20")
//!     .rule("owner_id", "foreign_int:users,id");
//!
//! let lookup = StaticLookup::new().with("users", "id", [json!(1)]);
//! let data = json!({"name": "Widget", "owner_id": 1});
//!
//! let result = ValidationEngine::new()
//!     .validate(data.as_object().unwrap(), &rules, &lookup)
//!     .await?;
//! assert!(result.passes());
//! ```

pub mod engine;
pub mod exists;
pub mod rules;

pub use engine::{RuleSet, ValidationEngine};
pub use exists::{ExistsChecker, StaticLookup};
pub use rules::{Rule, RuleDescriptor, parse};

use serde::Serialize;
use serde::ser::SerializeMap;
use std::fmt;

/// A single failed constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Field-keyed validation messages. Empty means the data passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    fields: Vec<(String, Vec<String>)>,
}

impl ValidationResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message` to the messages of `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        let message = message.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, messages)) => messages.push(message),
            None => self.fields.push((field, vec![message])),
        }
    }

    /// Appends every message of `other`, keeping field order.
    pub fn merge(&mut self, other: ValidationResult) {
        for (field, messages) in other.fields {
            for message in messages {
                self.add(field.clone(), message);
            }
        }
    }

    #[must_use]
    pub fn passes(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn fails(&self) -> bool {
        !self.passes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of failing fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, messages)| messages.as_slice())
    }

    #[must_use]
    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// Every message flattened in field order.
    #[must_use]
    pub fn all(&self) -> Vec<ValidationError> {
        self.fields
            .iter()
            .flat_map(|(field, messages)| {
                messages
                    .iter()
                    .map(move |message| ValidationError::new(field.clone(), message.clone()))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Converts to `Err(self)` when any field failed.
    ///
    /// # Errors
    ///
    /// Returns the result itself when it holds at least one message.
    pub fn result(self) -> Result<(), Self> {
        if self.passes() { Ok(()) } else { Err(self) }
    }
}

impl Serialize for ValidationResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, messages) in &self.fields {
            map.serialize_entry(field, messages)?;
        }
        map.end()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed with {} error(s):", self.all().len())?;
        for error in self.all() {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationResult {}
