use async_trait::async_trait;
use sea_orm::DbErr;
use serde_json::{Map, Value};

use super::query::Query;

/// One row, column name to value.
pub type Record = Map<String, Value>;

/// The data-access port the model layer persists through.
///
/// Implementations own transactions and statement atomicity; every call here
/// is expected to be a single statement.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` when the statement fails.
    async fn fetch(&self, query: &Query) -> Result<Vec<Record>, DbErr>;

    /// First row matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` when the statement fails.
    async fn fetch_first(&self, query: &Query) -> Result<Option<Record>, DbErr> {
        let rows = self.fetch(&query.clone().take(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Number of rows matching `query`, ignoring its offset and limit.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` when the statement fails.
    async fn count(&self, query: &Query) -> Result<u64, DbErr>;

    /// Inserts `attributes` and returns the stored row, including any
    /// generated primary key.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` when the statement fails.
    async fn insert(&self, table: &str, primary_key: &str, attributes: &Record)
    -> Result<Record, DbErr>;

    /// Updates the row whose `primary_key` equals `key`; returns rows affected.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` when the statement fails.
    async fn update(
        &self,
        table: &str,
        primary_key: &str,
        key: &Value,
        attributes: &Record,
    ) -> Result<u64, DbErr>;

    /// Deletes the row whose `primary_key` equals `key`; returns rows affected.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` when the statement fails.
    async fn delete(&self, table: &str, primary_key: &str, key: &Value) -> Result<u64, DbErr>;

    /// Column names of `table`, in table order.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` when the schema cannot be read.
    async fn column_listing(&self, table: &str) -> Result<Vec<String>, DbErr>;
}
