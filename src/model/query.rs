use serde_json::Value;
use std::sync::Arc;

use super::definition::ModelType;
use super::entity::Entity;
use crate::database::{Direction, Operator, Query, Repository};
use crate::errors::ApiError;

/// Chainable query over one model type's table, yielding entities.
pub struct QueryHandle<'a> {
    model: Arc<ModelType>,
    repository: &'a dyn Repository,
    query: Query,
}

impl<'a> QueryHandle<'a> {
    pub(crate) fn new(model: Arc<ModelType>, repository: &'a dyn Repository) -> Self {
        let query = Query::table(model.table());
        Self {
            model,
            repository,
            query,
        }
    }

    #[must_use]
    pub fn where_eq(mut self, column: &str, value: Value) -> Self {
        self.query = self.query.where_eq(column, value);
        self
    }

    #[must_use]
    pub fn where_op(mut self, column: &str, operator: Operator, value: Value) -> Self {
        self.query = self.query.where_op(column, operator, value);
        self
    }

    #[must_use]
    pub fn group_by(mut self, column: &str) -> Self {
        self.query = self.query.group_by(column);
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.query = self.query.order_by(column, direction);
        self
    }

    #[must_use]
    pub fn skip(mut self, offset: u64) -> Self {
        self.query = self.query.skip(offset);
        self
    }

    #[must_use]
    pub fn take(mut self, limit: u64) -> Self {
        self.query = self.query.take(limit);
        self
    }

    /// Replaces the underlying query, e.g. with one a resource hook built.
    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// # Errors
    ///
    /// Returns an `ApiError` when the repository fails.
    pub async fn get(self) -> Result<Vec<Entity>, ApiError> {
        let rows = self.repository.fetch(&self.query).await?;
        Ok(rows
            .into_iter()
            .map(|row| Entity::from_row(Arc::clone(&self.model), row))
            .collect())
    }

    /// # Errors
    ///
    /// Returns an `ApiError` when the repository fails.
    pub async fn first(self) -> Result<Option<Entity>, ApiError> {
        let row = self.repository.fetch_first(&self.query).await?;
        Ok(row.map(|row| Entity::from_row(self.model, row)))
    }

    /// The entity whose primary key equals `key`.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when the repository fails.
    pub async fn find(self, key: Value) -> Result<Option<Entity>, ApiError> {
        let primary_key = self.model.primary_key().to_string();
        self.where_eq(&primary_key, key).first().await
    }

    /// # Errors
    ///
    /// Returns `ApiError::NotFound` when no row has primary key `key`.
    pub async fn find_or_fail(self, key: Value) -> Result<Entity, ApiError> {
        let name = self.model.name().to_string();
        let shown = display_key(&key);
        self.find(key).await?.ok_or_else(|| {
            ApiError::not_found(format!("No query results for model [{name}] {shown}."))
        })
    }

    /// Rows matching the query, ignoring offset and limit.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when the repository fails.
    pub async fn count(self) -> Result<u64, ApiError> {
        Ok(self.repository.count(&self.query).await?)
    }
}

/// A key as users typed it: strings without quotes.
pub(crate) fn display_key(key: &Value) -> String {
    match key {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
