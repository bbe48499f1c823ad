//! Process-wide caches, injected rather than global.
//!
//! Both are append-only: the first value stored under a key wins and later
//! writes get the stored value back.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::definition::ModelType;
use crate::database::Repository;
use sea_orm::DbErr;

/// Column listings per table, loaded from the repository on first use.
#[derive(Debug, Default)]
pub struct ColumnCache {
    tables: RwLock<HashMap<String, Arc<[String]>>>,
}

impl ColumnCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, table: &str) -> Option<Arc<[String]>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }

    /// Stores `columns` unless `table` is already cached; returns the cached
    /// listing either way.
    pub fn insert(&self, table: &str, columns: Vec<String>) -> Arc<[String]> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            tables
                .entry(table.to_string())
                .or_insert_with(|| columns.into()),
        )
    }

    /// Cached listing of `table`, asking `repository` on a miss.
    ///
    /// An empty listing (missing table, listing taken before a migration) is
    /// returned but not cached, so the next call asks again.
    ///
    /// # Errors
    ///
    /// Returns a `DbErr` when the listing has to be loaded and that fails.
    pub async fn load(&self, table: &str, repository: &dyn Repository) -> Result<Arc<[String]>, DbErr> {
        if let Some(columns) = self.get(table) {
            return Ok(columns);
        }
        let columns = repository.column_listing(table).await?;
        if columns.is_empty() {
            tracing::warn!(table, "column listing is empty, not cached");
            return Ok(columns.into());
        }
        tracing::debug!(table, columns = columns.len(), "column listing cached");
        Ok(self.insert(table, columns))
    }
}

/// Model types by name.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, Arc<ModelType>>>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `model` under its name unless that name is taken; returns
    /// the registered type.
    pub fn register(&self, model: ModelType) -> Arc<ModelType> {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            models
                .entry(model.name().to_string())
                .or_insert_with(|| Arc::new(model)),
        )
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ModelType>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
