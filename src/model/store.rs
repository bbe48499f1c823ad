use std::fmt;
use std::sync::Arc;

use super::definition::ModelType;
use super::query::QueryHandle;
use super::registry::{ColumnCache, ModelRegistry};
use crate::database::{Record, Repository};
use crate::errors::ApiError;
use crate::validation::ExistsChecker;

/// The collaborators an entity needs to persist itself: the repository, the
/// `exists` checker used by validation and the shared caches.
#[derive(Clone)]
pub struct Store {
    repository: Arc<dyn Repository>,
    checker: Arc<dyn ExistsChecker>,
    columns: Arc<ColumnCache>,
    registry: Arc<ModelRegistry>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("columns", &self.columns)
            .field("registry", &self.registry.names())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// A store whose backend answers both queries and `exists` lookups, such
    /// as [`SeaOrmRepository`](crate::database::SeaOrmRepository).
    pub fn new<B>(backend: B) -> Self
    where
        B: Repository + ExistsChecker + 'static,
    {
        let backend = Arc::new(backend);
        Self::from_parts(backend.clone(), backend)
    }

    pub fn from_parts(repository: Arc<dyn Repository>, checker: Arc<dyn ExistsChecker>) -> Self {
        Self {
            repository,
            checker,
            columns: Arc::new(ColumnCache::new()),
            registry: Arc::new(ModelRegistry::new()),
        }
    }

    /// Replaces the `exists` checker, e.g. with a `StaticLookup`.
    #[must_use]
    pub fn with_checker(mut self, checker: Arc<dyn ExistsChecker>) -> Self {
        self.checker = checker;
        self
    }

    /// Shares a column cache with other stores.
    #[must_use]
    pub fn with_column_cache(mut self, columns: Arc<ColumnCache>) -> Self {
        self.columns = columns;
        self
    }

    /// Shares a model registry with other stores.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn repository(&self) -> &dyn Repository {
        self.repository.as_ref()
    }

    #[must_use]
    pub fn checker(&self) -> &dyn ExistsChecker {
        self.checker.as_ref()
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnCache {
        &self.columns
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Registers `model` in this store's registry.
    pub fn register(&self, model: ModelType) -> Arc<ModelType> {
        self.registry.register(model)
    }

    /// Query handle over the table of `model`.
    #[must_use]
    pub fn query(&self, model: &Arc<ModelType>) -> QueryHandle<'_> {
        QueryHandle::new(Arc::clone(model), self.repository())
    }

    /// Column listing of the model's table.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when the listing cannot be loaded, and a
    /// configuration error when the table has no columns.
    pub async fn table_columns(&self, model: &ModelType) -> Result<Arc<[String]>, ApiError> {
        let columns = self.columns.load(model.table(), self.repository()).await?;
        if columns.is_empty() {
            return Err(ApiError::configuration(
                model.name(),
                format!("{} table '{}' has no columns.", model.name(), model.table()),
            ));
        }
        Ok(columns)
    }

    /// The keys of `input` that are columns of the model's table, or of its
    /// morph child's table.
    ///
    /// # Errors
    ///
    /// See [`Store::table_columns`].
    pub async fn restrict_to_columns(
        &self,
        model: &ModelType,
        input: &Record,
    ) -> Result<Record, ApiError> {
        let columns = self.table_columns(model).await?;
        let morph_columns = match model.morph() {
            Some(morph) => self.table_columns(morph.model()).await?,
            None => Arc::from(Vec::new()),
        };
        Ok(input
            .iter()
            .filter(|(name, _)| {
                columns.iter().chain(morph_columns.iter()).any(|column| column == *name)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }
}
