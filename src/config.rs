//! Dispatcher configuration.
//!
//! Every field has a default, so a partial document deserializes:
//!
//! ```rust,ignore
//! let config: DispatcherConfig = serde_json::from_value(json!({
//!     "max_take": 50,
//!     "messages": {"not_found": "No :class with key :val."},
//!     "exception_statuses": {"quota": 429}
//! }))?;
//! ```

use axum::http::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;

/// Message used when a key is in none of the three message layers.
pub const MISSING_MESSAGE: &str = "Error message not found.";

const DEFAULT_MESSAGES: &[(&str, &str)] = &[
    ("not_found", "Error :val not found in :class data."),
    ("missing_id", "Error :class requires an identifier."),
    ("not_saved", "Error :class could not be saved."),
    ("not_deleted", "Error :class could not be deleted."),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Page size when the request gives no `take`
    pub default_take: u64,
    /// Upper bound for `take`
    pub max_take: u64,
    /// Data key of the index collection
    pub results_key: String,
    /// Data key of the single serialized entity
    pub entity_key: String,
    /// Translated messages; consulted first
    pub translations: HashMap<String, String>,
    /// Application messages; consulted after translations
    pub messages: HashMap<String, String>,
    /// Domain error category to HTTP status
    pub exception_statuses: HashMap<String, u16>,
    /// Status for categories missing from `exception_statuses`
    pub default_exception_status: u16,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_take: 10,
            max_take: 100,
            results_key: "results".to_string(),
            entity_key: "class".to_string(),
            translations: HashMap::new(),
            messages: HashMap::new(),
            exception_statuses: HashMap::new(),
            default_exception_status: 400,
        }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default_take(mut self, take: u64) -> Self {
        self.default_take = take;
        self
    }

    #[must_use]
    pub fn with_max_take(mut self, take: u64) -> Self {
        self.max_take = take;
        self
    }

    #[must_use]
    pub fn with_results_key(mut self, key: impl Into<String>) -> Self {
        self.results_key = key.into();
        self
    }

    #[must_use]
    pub fn with_entity_key(mut self, key: impl Into<String>) -> Self {
        self.entity_key = key.into();
        self
    }

    #[must_use]
    pub fn with_translation(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.translations.insert(key.into(), message.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(key.into(), message.into());
        self
    }

    #[must_use]
    pub fn with_exception_status(mut self, category: impl Into<String>, status: StatusCode) -> Self {
        self.exception_statuses
            .insert(category.into(), status.as_u16());
        self
    }

    /// Message template for `key`: translated, then custom, then built-in.
    #[must_use]
    pub fn message(&self, key: &str) -> &str {
        self.translations
            .get(key)
            .or_else(|| self.messages.get(key))
            .map(String::as_str)
            .or_else(|| {
                DEFAULT_MESSAGES
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, message)| *message)
            })
            .unwrap_or(MISSING_MESSAGE)
    }

    /// Status for a domain error category.
    #[must_use]
    pub fn status_for(&self, category: &str) -> StatusCode {
        let code = self
            .exception_statuses
            .get(category)
            .copied()
            .unwrap_or(self.default_exception_status);
        StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
    }
}
