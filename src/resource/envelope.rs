//! The `{data, errors, success}` response envelope.
//!
//! `data` and `errors` are ordered bags of keyed or positional entries. An
//! empty bag serializes as `{}`, a bag of positional entries only as an
//! array, anything else as an object whose positional entries take the next
//! free integer keys. `success` is never stored: it is "no errors".

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::validation::ValidationResult;

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Keyed(String, Value),
    Positional(Value),
}

/// Ordered mix of keyed and positional values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bag {
    entries: Vec<Entry>,
}

impl Bag {
    /// Sets `key`, keeping its position when it is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let position = self
            .entries
            .iter()
            .position(|entry| matches!(entry, Entry::Keyed(existing, _) if *existing == key));
        match position {
            Some(index) => self.entries[index] = Entry::Keyed(key, value),
            None => self.entries.push(Entry::Keyed(key, value)),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.entries.push(Entry::Positional(value));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self
            .entries
            .iter()
            .position(|entry| matches!(entry, Entry::Keyed(existing, _) if existing == key))?;
        match self.entries.remove(index) {
            Entry::Keyed(_, value) | Entry::Positional(value) => Some(value),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Keyed(existing, value) if existing == key => Some(value),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        if !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|entry| matches!(entry, Entry::Positional(_)))
        {
            return Value::Array(
                self.entries
                    .iter()
                    .filter_map(|entry| match entry {
                        Entry::Positional(value) => Some(value.clone()),
                        Entry::Keyed(..) => None,
                    })
                    .collect(),
            );
        }

        let mut object = Map::new();
        let mut next_index = 0_usize;
        for entry in &self.entries {
            match entry {
                Entry::Keyed(key, value) => {
                    if let Ok(index) = key.parse::<usize>() {
                        next_index = next_index.max(index + 1);
                    }
                    object.insert(key.clone(), value.clone());
                }
                Entry::Positional(value) => {
                    object.insert(next_index.to_string(), value.clone());
                    next_index += 1;
                }
            }
        }
        Value::Object(object)
    }
}

impl Serialize for Bag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseEnvelope {
    data: Bag,
    errors: Bag,
    token: Option<String>,
    status: Option<StatusCode>,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.data.insert(key, value);
        self
    }

    pub fn push_data(&mut self, value: Value) -> &mut Self {
        self.data.push(value);
        self
    }

    pub fn remove_data(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn add_error(&mut self, key: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors.insert(key, Value::String(message.into()));
        self
    }

    pub fn push_error(&mut self, message: impl Into<String>) -> &mut Self {
        self.errors.push(Value::String(message.into()));
        self
    }

    pub fn remove_error(&mut self, key: &str) -> Option<Value> {
        self.errors.remove(key)
    }

    /// Adds every failing field of `result` as an error keyed by field.
    pub fn merge_validation(&mut self, result: &ValidationResult) -> &mut Self {
        for (field, messages) in result.fields() {
            self.errors.insert(
                field,
                Value::Array(messages.iter().cloned().map(Value::String).collect()),
            );
        }
        self
    }

    #[must_use]
    pub fn data(&self) -> &Bag {
        &self.data
    }

    #[must_use]
    pub fn errors(&self) -> &Bag {
        &self.errors
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn set_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = Some(status);
        self
    }

    pub fn set_status_if_unset(&mut self, status: StatusCode) -> &mut Self {
        self.status.get_or_insert(status);
        self
    }

    /// Status explicitly set by a hook or an error, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The explicit status, else 200 on success and 400 otherwise.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(if self.success() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        })
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("data".to_string(), self.data.to_json());
        object.insert("errors".to_string(), self.errors.to_json());
        object.insert("success".to_string(), Value::Bool(self.success()));
        if let Some(token) = &self.token {
            object.insert("token".to_string(), Value::String(token.clone()));
        }
        Value::Object(object)
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("data", &self.data)?;
        map.serialize_entry("errors", &self.errors)?;
        map.serialize_entry("success", &self.success())?;
        if let Some(token) = &self.token {
            map.serialize_entry("token", token)?;
        }
        map.end()
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Wire shape of a [`ResponseEnvelope`], for `OpenAPI` documents.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct EnvelopeSchema {
    /// Keyed results, or an array of positional ones
    #[schema(value_type = Object)]
    data: Value,
    /// Errors keyed by field or by kind (`not_found`), or an array
    #[schema(value_type = Object)]
    errors: Value,
    /// `true` exactly when `errors` is empty
    success: bool,
    /// Auth token, when one is attached
    token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_envelope() {
        let envelope = ResponseEnvelope::new();
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"data": {}, "errors": {}, "success": true})
        );
        assert_eq!(envelope.status_code(), StatusCode::OK);
    }

    #[test]
    fn test_success_is_derived_from_errors() {
        let mut envelope = ResponseEnvelope::new();
        envelope.add_error("not_found", "gone");
        assert!(!envelope.success());

        envelope.remove_error("not_found");
        assert!(envelope.success());
        assert_eq!(envelope.to_json()["errors"], json!({}));
    }

    #[test]
    fn test_positional_entries_serialize_as_array() {
        let mut envelope = ResponseEnvelope::new();
        envelope.push_error("first").push_error("second");
        assert_eq!(envelope.to_json()["errors"], json!(["first", "second"]));
        assert_eq!(envelope.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_mixed_entries_take_integer_keys() {
        let mut bag = Bag::default();
        bag.push(json!("a"));
        bag.insert("name", json!("b"));
        bag.push(json!("c"));
        assert_eq!(bag.to_json(), json!({"0": "a", "name": "b", "1": "c"}));
    }

    #[test]
    fn test_keyed_insert_replaces_in_place() {
        let mut bag = Bag::default();
        bag.insert("a", json!(1));
        bag.insert("b", json!(2));
        bag.insert("a", json!(3));
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.get("a"), Some(&json!(3)));
    }

    #[test]
    fn test_merge_validation() {
        let mut result = ValidationResult::new();
        result.add("name", "The name field is required.");
        result.add("price", "The price must be a number.");

        let mut envelope = ResponseEnvelope::new();
        envelope.merge_validation(&result);
        assert_eq!(
            envelope.to_json()["errors"],
            json!({
                "name": ["The name field is required."],
                "price": ["The price must be a number."]
            })
        );
    }

    #[test]
    fn test_token_and_explicit_status() {
        let mut envelope = ResponseEnvelope::new();
        envelope
            .add_data("class", json!({"id": 1}))
            .set_token("abc")
            .set_status(StatusCode::CREATED);
        envelope.set_status_if_unset(StatusCode::IM_A_TEAPOT);

        assert_eq!(
            envelope.to_json(),
            json!({"data": {"class": {"id": 1}}, "errors": {}, "success": true, "token": "abc"})
        );
        assert_eq!(envelope.token(), Some("abc"));
        assert_eq!(envelope.status_code(), StatusCode::CREATED);
    }

    #[test]
    fn test_schema_name() {
        assert_eq!(EnvelopeSchema::name(), "EnvelopeSchema");
    }
}
