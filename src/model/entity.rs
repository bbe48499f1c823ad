use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::definition::ModelType;
use super::events::LifecycleEvent;
use super::relationships::{self, RelatedResult, Relation, Resolved};
use super::store::Store;
use crate::database::Record;
use crate::errors::ApiError;
use crate::validation::ValidationResult;

/// One record of a [`ModelType`].
///
/// Attributes are the persisted columns. Relations loaded by name sit in a
/// separate cache and computed values in a per-entity memory; neither is
/// ever written back to the attributes. A type with a morph-one child keeps
/// the child entity and the input routed to it alongside.
#[derive(Clone)]
pub struct Entity {
    model: Arc<ModelType>,
    attributes: Record,
    original: Record,
    exists: bool,
    relations: HashMap<String, RelatedResult>,
    memory: HashMap<String, Value>,
    errors: ValidationResult,
    input: Option<Record>,
    morph: Option<Box<Entity>>,
    morph_input: Record,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.model.name())
            .field("attributes", &self.attributes)
            .field("exists", &self.exists)
            .field("relations", &self.relations)
            .field("errors", &self.errors)
            .field("morph", &self.morph)
            .finish_non_exhaustive()
    }
}

impl Entity {
    #[must_use]
    pub fn new(model: Arc<ModelType>) -> Self {
        Self {
            model,
            attributes: Map::new(),
            original: Map::new(),
            exists: false,
            relations: HashMap::new(),
            memory: HashMap::new(),
            errors: ValidationResult::new(),
            input: None,
            morph: None,
            morph_input: Map::new(),
        }
    }

    /// A new entity that auto-hydrates from `input` when it is created.
    #[must_use]
    pub fn from_input(model: Arc<ModelType>, input: Record) -> Self {
        let mut entity = Self::new(model);
        entity.input = Some(input);
        entity
    }

    /// An entity for a row that is already stored.
    #[must_use]
    pub fn from_row(model: Arc<ModelType>, row: Record) -> Self {
        let mut entity = Self::new(model);
        entity.original = row.clone();
        entity.attributes = row;
        entity.exists = true;
        entity
    }

    #[must_use]
    pub fn model(&self) -> &ModelType {
        &self.model
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    #[must_use]
    pub fn attributes(&self) -> &Record {
        &self.attributes
    }

    #[must_use]
    pub fn original(&self) -> &Record {
        &self.original
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Primary key value, if set and not null.
    #[must_use]
    pub fn key(&self) -> Option<&Value> {
        self.attributes
            .get(self.model.primary_key())
            .filter(|key| !key.is_null())
    }

    /// Attributes that differ from the last persisted state.
    #[must_use]
    pub fn dirty(&self) -> Record {
        self.attributes
            .iter()
            .filter(|(name, value)| self.original.get(name.as_str()) != Some(value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Mass-assigns the fillable keys of `attributes`.
    ///
    /// On a type with a morph child every key is also kept for the child;
    /// the save sorts them by table columns.
    pub fn fill(&mut self, attributes: &Record) -> &mut Self {
        for (name, value) in attributes {
            if self.model.is_fillable(name) {
                self.attributes.insert(name.clone(), value.clone());
            }
        }
        if self.model.morph().is_some() {
            self.morph_input
                .extend(attributes.iter().map(|(name, value)| (name.clone(), value.clone())));
        }
        self
    }

    /// Assigns every key of `attributes`, ignoring the mass-assignment lists.
    pub fn force_fill(&mut self, attributes: &Record) -> &mut Self {
        for (name, value) in attributes {
            self.attributes.insert(name.clone(), value.clone());
        }
        self
    }

    #[must_use]
    pub fn input(&self) -> Option<&Record> {
        self.input.as_ref()
    }

    pub fn set_input(&mut self, input: Record) -> &mut Self {
        self.input = Some(input);
        self
    }

    /// Fills fillable attributes that are still unset from the input bag.
    pub fn hydrate(&mut self) {
        let Some(input) = self.input.take() else {
            return;
        };
        for (name, value) in &input {
            if !self.attributes.contains_key(name) && self.model.is_fillable(name) {
                self.attributes.insert(name.clone(), value.clone());
            }
        }
        self.input = Some(input);
    }

    /// Errors of the last validation run.
    #[must_use]
    pub fn errors(&self) -> &ValidationResult {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ValidationResult {
        &mut self.errors
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.fails()
    }

    /// Turns the last validation errors into a domain error.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Domain` with category `validation` when the entity
    /// carries errors.
    pub fn throw_errors(&self) -> Result<(), ApiError> {
        if self.errors.passes() {
            return Ok(());
        }
        Err(ApiError::domain_with_errors(
            "validation",
            format!("{} failed validation.", self.model.name()),
            self.errors.clone(),
        ))
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelatedResult> {
        self.relations.get(name)
    }

    #[must_use]
    pub fn relations(&self) -> &HashMap<String, RelatedResult> {
        &self.relations
    }

    pub fn set_relation(&mut self, name: impl Into<String>, results: RelatedResult) -> &mut Self {
        self.relations.insert(name.into(), results);
        self
    }

    pub fn unset_relation(&mut self, name: &str) -> Option<RelatedResult> {
        self.relations.remove(name)
    }

    /// Value of the computed getter `name`, evaluated once per entity.
    pub fn computed(&mut self, name: &str) -> Option<Value> {
        if let Some(value) = self.memory.get(name) {
            return Some(value.clone());
        }
        let getter = Arc::clone(self.model.computed(name)?);
        let value = getter(self);
        self.memory.insert(name.to_string(), value.clone());
        Some(value)
    }

    /// Drops a memoized computed value.
    pub fn forget(&mut self, name: &str) {
        self.memory.remove(name);
    }

    /// The morph child, once loaded or staged by validation or save.
    #[must_use]
    pub fn morph(&self) -> Option<&Entity> {
        self.morph.as_deref()
    }

    /// Filled input not yet applied to the morph child.
    #[must_use]
    pub fn morph_input(&self) -> &Record {
        &self.morph_input
    }

    /// Loads the stored morph child of this entity.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when the repository fails.
    pub async fn load_morph(&mut self, store: &Store) -> Result<Option<&Entity>, ApiError> {
        let model = Arc::clone(&self.model);
        let Some(morph) = model.morph().filter(|_| self.morph.is_none() && self.exists) else {
            return Ok(self.morph.as_deref());
        };
        let related = morph.relation(self).get_results(store.repository()).await?;
        if let RelatedResult::One(Some(row)) = related {
            self.morph = Some(Box::new(Entity::from_row(Arc::clone(morph.model()), row)));
        }
        Ok(self.morph.as_deref())
    }

    /// Sorts attributes and pending input between this entity and its morph
    /// child: attributes outside the own table are dropped, input inside the
    /// child's table is filled into the child, which is created when none is
    /// stored.
    async fn stage_morph(&mut self, store: &Store) -> Result<(), ApiError> {
        let model = Arc::clone(&self.model);
        let Some(morph) = model.morph() else {
            return Ok(());
        };

        let columns = store.table_columns(&model).await?;
        self.attributes
            .retain(|name, _| columns.iter().any(|column| column == name));

        self.load_morph(store).await?;
        let child_columns = store.table_columns(morph.model()).await?;
        let input: Record = std::mem::take(&mut self.morph_input)
            .into_iter()
            .filter(|(name, _)| child_columns.iter().any(|column| column == name))
            .collect();
        self.morph
            .get_or_insert_with(|| Box::new(Entity::new(Arc::clone(morph.model()))))
            .fill(&input);
        Ok(())
    }

    /// Keys the staged morph child to this entity and saves it.
    async fn save_morph(&mut self, store: &Store) -> Result<bool, ApiError> {
        let model = Arc::clone(&self.model);
        let (Some(morph), Some(key)) = (model.morph(), self.key().cloned()) else {
            return Ok(true);
        };
        let Some(child) = self.morph.as_deref_mut() else {
            return Ok(true);
        };

        child.set_attribute(morph.id_column(), key);
        child.set_attribute(morph.type_column(), Value::String(model.name().to_string()));
        if child.save_own(store).await? {
            return Ok(true);
        }

        tracing::warn!(model = model.name(), morph = morph.name(), "morph child not saved");
        let child_errors = child.errors().clone();
        self.errors.merge(child_errors);
        Ok(false)
    }

    /// # Errors
    ///
    /// See [`relationships::resolve`].
    pub async fn resolve(&mut self, name: &str, store: &Store) -> Result<Resolved, ApiError> {
        relationships::resolve(self, name, store).await
    }

    /// # Errors
    ///
    /// See [`relationships::call_relationship`].
    pub fn call_relationship(&self, name: &str) -> Result<Option<Relation>, ApiError> {
        relationships::call_relationship(self, name)
    }

    /// Runs the type's rules against the attributes.
    ///
    /// Returns `false` when a `validating` handler halted or a rule failed;
    /// the messages are kept in [`Entity::errors`]. A morph child's data is
    /// checked against the child's rules (less its two key columns) and its
    /// messages merged in.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when an `exists` lookup cannot be performed.
    pub async fn validate(&mut self, store: &Store) -> Result<bool, ApiError> {
        let model = Arc::clone(&self.model);
        self.errors.clear();

        if model.events().fire(LifecycleEvent::Validating, self).is_halt() {
            return Ok(false);
        }

        self.stage_morph(store).await?;
        self.errors = model
            .validator()
            .validate(&self.attributes, model.rules(), store.checker())
            .await?;

        if let Some(morph) = model.morph() {
            let empty = Record::new();
            let data = self.morph.as_deref().map_or(&empty, Entity::attributes);
            let child_errors = morph
                .model()
                .validator()
                .validate(data, &morph.rules(), store.checker())
                .await?;
            self.errors.merge(child_errors);
        }

        model.events().fire(LifecycleEvent::Validated, self);
        Ok(self.errors.passes())
    }

    /// Persists the entity.
    ///
    /// Order: `saving`, then `creating` or `updating`, then validation (when
    /// enabled on the type), then the insert or update, then `created` or
    /// `updated`, then `saved`. Returns `false` without persisting when a
    /// halting handler stopped it or validation failed.
    ///
    /// A morph child is saved after `saved`, keyed to this entity; when that
    /// fails the child's errors are merged in and `false` is returned.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when the repository fails.
    pub async fn save(&mut self, store: &Store) -> Result<bool, ApiError> {
        if !self.save_own(store).await? {
            return Ok(false);
        }
        self.save_morph(store).await
    }

    async fn save_own(&mut self, store: &Store) -> Result<bool, ApiError> {
        let model = Arc::clone(&self.model);
        let events = model.events();

        if events.fire(LifecycleEvent::Saving, self).is_halt() {
            return Ok(false);
        }

        let creating = !self.exists;
        let (before, after) = if creating {
            (LifecycleEvent::Creating, LifecycleEvent::Created)
        } else {
            (LifecycleEvent::Updating, LifecycleEvent::Updated)
        };
        if events.fire(before, self).is_halt() {
            return Ok(false);
        }

        self.stage_morph(store).await?;
        if model.validates_on_save() && !self.validate(store).await? {
            tracing::warn!(
                model = model.name(),
                fields = self.errors.len(),
                "validation failed on save"
            );
            return Ok(false);
        }

        if creating {
            let stored = store
                .repository()
                .insert(model.table(), model.primary_key(), &self.attributes)
                .await?;
            self.attributes = stored;
            self.exists = true;
        } else {
            let dirty = self.dirty();
            if !dirty.is_empty() {
                let key = self.key().cloned().ok_or_else(|| {
                    ApiError::internal(
                        "A database error occurred",
                        Some(format!("{} has no primary key value", model.name())),
                    )
                })?;
                store
                    .repository()
                    .update(model.table(), model.primary_key(), &key, &dirty)
                    .await?;
            }
        }
        self.original = self.attributes.clone();

        events.fire(after, self);
        events.fire(LifecycleEvent::Saved, self);
        Ok(true)
    }

    /// Deletes the stored row. Returns `false` for an entity that was never
    /// stored or when a `deleting` handler halted. A stored morph child is
    /// deleted first.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when the repository fails.
    pub async fn delete(&mut self, store: &Store) -> Result<bool, ApiError> {
        if !self.exists {
            return Ok(false);
        }
        let model = Arc::clone(&self.model);

        if model.events().fire(LifecycleEvent::Deleting, self).is_halt() {
            return Ok(false);
        }

        self.load_morph(store).await?;
        if let Some(child) = self.morph.as_deref_mut().filter(|child| child.exists()) {
            child.delete_own(store).await?;
        }
        self.delete_row(store).await
    }

    async fn delete_own(&mut self, store: &Store) -> Result<bool, ApiError> {
        if !self.exists {
            return Ok(false);
        }
        let model = Arc::clone(&self.model);
        if model.events().fire(LifecycleEvent::Deleting, self).is_halt() {
            return Ok(false);
        }
        self.delete_row(store).await
    }

    async fn delete_row(&mut self, store: &Store) -> Result<bool, ApiError> {
        let model = Arc::clone(&self.model);

        let Some(key) = self.key().cloned() else {
            return Ok(false);
        };
        store
            .repository()
            .delete(model.table(), model.primary_key(), &key)
            .await?;
        self.exists = false;

        model.events().fire(LifecycleEvent::Deleted, self);
        Ok(true)
    }

    /// Attributes plus loaded relations and a stored morph child, as sent to
    /// clients. An attribute wins over a relation of the same name.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = self.attributes.clone();
        let mut names: Vec<&String> = self.relations.keys().collect();
        names.sort_unstable();
        for name in names {
            object
                .entry(name.clone())
                .or_insert_with(|| self.relations[name].to_json());
        }
        let child = self.morph.as_deref().filter(|child| child.exists());
        if let (Some(morph), Some(child)) = (self.model.morph(), child) {
            object
                .entry(morph.name().to_string())
                .or_insert_with(|| child.to_json());
        }
        Value::Object(object)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Query, Repository};
    use crate::model::events::Propagation;
    use crate::validation::StaticLookup;
    use async_trait::async_trait;
    use sea_orm::DbErr;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every write and hands out sequential ids.
    #[derive(Default)]
    struct RecordingRepository {
        writes: Mutex<Vec<String>>,
    }

    impl RecordingRepository {
        fn writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Repository for RecordingRepository {
        async fn fetch(&self, _query: &Query) -> Result<Vec<Record>, DbErr> {
            Ok(vec![])
        }
        async fn count(&self, _query: &Query) -> Result<u64, DbErr> {
            Ok(0)
        }
        async fn insert(&self, table: &str, key: &str, attributes: &Record) -> Result<Record, DbErr> {
            self.writes.lock().unwrap().push(format!("insert {table}"));
            let mut stored = attributes.clone();
            stored.insert(key.to_string(), json!(1));
            Ok(stored)
        }
        async fn update(&self, table: &str, _: &str, key: &Value, dirty: &Record) -> Result<u64, DbErr> {
            let mut columns: Vec<&String> = dirty.keys().collect();
            columns.sort();
            self.writes
                .lock()
                .unwrap()
                .push(format!("update {table} {key} {columns:?}"));
            Ok(1)
        }
        async fn delete(&self, table: &str, _: &str, key: &Value) -> Result<u64, DbErr> {
            self.writes.lock().unwrap().push(format!("delete {table} {key}"));
            Ok(1)
        }
        async fn column_listing(&self, _: &str) -> Result<Vec<String>, DbErr> {
            Ok(vec![])
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn store(repository: &Arc<RecordingRepository>) -> Store {
        Store::from_parts(repository.clone(), Arc::new(StaticLookup::new()))
    }

    fn logged_type(log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<ModelType> {
        let mut builder = ModelType::builder("Widget")
            .table("widgets")
            .rule("name", "required|string");
        for event in LifecycleEvent::ALL {
            let log = Arc::clone(log);
            builder = builder.on(event, move |_| {
                log.lock().unwrap().push(event.name());
                Propagation::Continue
            });
        }
        Arc::new(builder.build())
    }

    #[tokio::test]
    async fn test_create_fires_events_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let repository = Arc::new(RecordingRepository::default());
        let mut entity = Entity::new(logged_type(&log));
        entity.fill(&record(json!({"name": "Gear"})));

        assert!(entity.save(&store(&repository)).await.unwrap());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["saving", "creating", "validating", "validated", "created", "saved"]
        );
        assert!(entity.exists());
        assert_eq!(entity.key(), Some(&json!(1)));
        assert!(!entity.is_dirty());
        assert_eq!(repository.writes(), vec!["insert widgets"]);
    }

    #[tokio::test]
    async fn test_update_writes_only_dirty_attributes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let repository = Arc::new(RecordingRepository::default());
        let mut entity = Entity::from_row(
            logged_type(&log),
            record(json!({"id": 4, "name": "Gear", "price": 3})),
        );
        entity.fill(&record(json!({"id": 99, "price": 5})));

        assert!(entity.save(&store(&repository)).await.unwrap());
        assert_eq!(entity.key(), Some(&json!(4)));
        assert_eq!(repository.writes(), vec![r#"update widgets 4 ["price"]"#]);
        assert_eq!(log.lock().unwrap()[1], "updating");
    }

    #[tokio::test]
    async fn test_validation_failure_stops_save() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let repository = Arc::new(RecordingRepository::default());
        let mut entity = Entity::new(logged_type(&log));

        assert!(!entity.save(&store(&repository)).await.unwrap());
        assert_eq!(
            entity.errors().first("name"),
            Some("The name field is required.")
        );
        assert!(repository.writes().is_empty());
        assert!(!log.lock().unwrap().contains(&"saved"));

        let err = entity.throw_errors().unwrap_err();
        assert!(matches!(err, ApiError::Domain { ref category, .. } if category == "validation"));
    }

    #[tokio::test]
    async fn test_halting_handler_aborts_save() {
        let repository = Arc::new(RecordingRepository::default());
        let model = Arc::new(
            ModelType::builder("Widget")
                .on(LifecycleEvent::Creating, |entity| {
                    Propagation::from(entity.attribute("name") != Some(&json!("forbidden")))
                })
                .build(),
        );
        let mut entity = Entity::new(model);
        entity.fill(&record(json!({"name": "forbidden"})));

        assert!(!entity.save(&store(&repository)).await.unwrap());
        assert!(!entity.exists());
        assert!(entity.errors().passes());
        assert!(repository.writes().is_empty());
    }

    #[tokio::test]
    async fn test_auto_hydration_keeps_existing_attributes() {
        let repository = Arc::new(RecordingRepository::default());
        let model = Arc::new(ModelType::builder("Widget").fillable(&["name", "price"]).build());
        let mut entity = Entity::from_input(
            model,
            record(json!({"name": "From input", "price": 9, "secret": true})),
        );
        entity.set_attribute("name", json!("Explicit"));

        assert!(entity.save(&store(&repository)).await.unwrap());
        assert_eq!(entity.attribute("name"), Some(&json!("Explicit")));
        assert_eq!(entity.attribute("price"), Some(&json!(9)));
        assert_eq!(entity.attribute("secret"), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let repository = Arc::new(RecordingRepository::default());
        let model = Arc::new(ModelType::builder("Widget").table("widgets").build());

        let mut fresh = Entity::new(Arc::clone(&model));
        assert!(!fresh.delete(&store(&repository)).await.unwrap());

        let mut entity = Entity::from_row(model, record(json!({"id": 2})));
        assert!(entity.delete(&store(&repository)).await.unwrap());
        assert!(!entity.exists());
        assert_eq!(repository.writes(), vec!["delete widgets 2"]);
    }

    #[test]
    fn test_computed_is_memoized() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let model = Arc::new(
            ModelType::builder("Widget")
                .computed("expensive", move |_| {
                    *counter.lock().unwrap() += 1;
                    json!(42)
                })
                .build(),
        );
        let mut entity = Entity::new(model);

        assert_eq!(entity.computed("expensive"), Some(json!(42)));
        assert_eq!(entity.computed("expensive"), Some(json!(42)));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(entity.computed("unknown"), None);

        entity.forget("expensive");
        entity.computed("expensive");
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_to_json_includes_relations() {
        let model = Arc::new(ModelType::builder("Widget").build());
        let mut entity = Entity::from_row(model, record(json!({"id": 1})));
        entity.set_relation("owner", RelatedResult::One(Some(record(json!({"id": 5})))));

        assert_eq!(entity.to_json(), json!({"id": 1, "owner": {"id": 5}}));
        assert!(entity.attribute("owner").is_none());
        assert!(entity.unset_relation("owner").is_some());
        assert_eq!(serde_json::to_value(&entity).unwrap(), json!({"id": 1}));
    }

    #[test]
    fn test_to_json_attribute_wins_over_relation() {
        let model = Arc::new(ModelType::builder("Widget").build());
        let mut entity = Entity::from_row(model, record(json!({"id": 1, "owner": "alice"})));
        entity.set_relation("owner", RelatedResult::One(Some(record(json!({"id": 5})))));
        entity.set_relation("parts", RelatedResult::Many(vec![]));

        assert_eq!(
            entity.to_json(),
            json!({"id": 1, "owner": "alice", "parts": []})
        );
        assert!(entity.relation("owner").is_some());
    }
}
