//! The `exists` lookup port used by `exists`, `foreign_int` and `foreign_str`.

use async_trait::async_trait;
use sea_orm::DbErr;
use serde_json::Value;
use std::collections::HashMap;

/// Answers "does `value` appear in `table.column`?".
///
/// Implemented by [`SeaOrmRepository`](crate::database::SeaOrmRepository)
/// against a live database and by [`StaticLookup`] for fixed reference data.
#[async_trait]
pub trait ExistsChecker: Send + Sync {
    /// # Errors
    ///
    /// Returns a `DbErr` when the lookup itself cannot be performed.
    async fn exists(&self, table: &str, column: &str, value: &Value) -> Result<bool, DbErr>;
}

/// In-memory lookup table.
///
/// Values compare loosely, the way a SQL equality against a typed column
/// does: `1` and `"1"` match.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    tables: HashMap<(String, String), Vec<String>>,
}

impl StaticLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<I>(mut self, table: &str, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.insert(table, column, values);
        self
    }

    pub fn insert<I>(&mut self, table: &str, column: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.tables
            .entry((table.to_string(), column.to_string()))
            .or_default()
            .extend(values.into_iter().filter_map(|value| loose_key(&value)));
    }
}

#[async_trait]
impl ExistsChecker for StaticLookup {
    async fn exists(&self, table: &str, column: &str, value: &Value) -> Result<bool, DbErr> {
        let Some(key) = loose_key(value) else {
            return Ok(false);
        };
        Ok(self
            .tables
            .get(&(table.to_string(), column.to_string()))
            .is_some_and(|values| values.contains(&key)))
    }
}

fn loose_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
