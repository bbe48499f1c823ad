//! Dynamic relationships
//!
//! A model type declares relationships by name as `{accessor, parameters}`.
//! Reading a name goes through [`resolve`]: cached relation first, then the
//! declared relationship (executed once and cached on the entity), then
//! computed getters, then plain attributes. Results loaded this way live in
//! the entity's relation cache only, never in its attributes.

use serde_json::Value;

use super::definition::Accessor;
use super::entity::Entity;
use super::store::Store;
use crate::database::{Query, Record, Repository};
use crate::errors::ApiError;

/// A relationship as declared on a model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    pub accessor: String,
    pub parameters: Vec<String>,
}

impl RelationshipDescriptor {
    pub fn new<I, S>(accessor: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accessor: accessor.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
}

/// A lazy relation: the query is only run by [`Relation::get_results`].
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    kind: RelationKind,
    /// `None` when the parent key is missing; such a relation is empty.
    query: Option<Query>,
}

impl Relation {
    /// Builds a relation of `kind` over `table` where `column` equals `key`.
    pub fn new(kind: RelationKind, table: &str, column: &str, key: Option<Value>) -> Self {
        let query = key
            .filter(|key| !key.is_null())
            .map(|key| Query::table(table).where_eq(column, key));
        Self { kind, query }
    }

    pub fn has_one(table: &str, foreign_key: &str, local_value: Option<Value>) -> Self {
        Self::new(RelationKind::HasOne, table, foreign_key, local_value)
    }

    pub fn has_many(table: &str, foreign_key: &str, local_value: Option<Value>) -> Self {
        Self::new(RelationKind::HasMany, table, foreign_key, local_value)
    }

    pub fn belongs_to(table: &str, owner_key: &str, foreign_value: Option<Value>) -> Self {
        Self::new(RelationKind::BelongsTo, table, owner_key, foreign_value)
    }

    #[must_use]
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    #[must_use]
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Further constrains the relation query (ordering, extra conditions).
    #[must_use]
    pub fn constrain(mut self, constrain: impl FnOnce(Query) -> Query) -> Self {
        self.query = self.query.map(constrain);
        self
    }

    /// Executes the relation.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when the repository fails.
    pub async fn get_results(&self, repository: &dyn Repository) -> Result<RelatedResult, ApiError> {
        let Some(query) = &self.query else {
            return Ok(match self.kind {
                RelationKind::HasMany => RelatedResult::Many(Vec::new()),
                RelationKind::HasOne | RelationKind::BelongsTo => RelatedResult::One(None),
            });
        };

        Ok(match self.kind {
            RelationKind::HasMany => RelatedResult::Many(repository.fetch(query).await?),
            RelationKind::HasOne | RelationKind::BelongsTo => {
                RelatedResult::One(repository.fetch_first(query).await?)
            }
        })
    }
}

/// Materialized relation results.
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedResult {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl RelatedResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(record) => record.is_none(),
            Self::Many(records) => records.is_empty(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::One(Some(record)) => Value::Object(record.clone()),
            Self::One(None) => Value::Null,
            Self::Many(records) => {
                Value::Array(records.iter().cloned().map(Value::Object).collect())
            }
        }
    }
}

/// What an accessor hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessed {
    Relation(Relation),
    /// Anything that is not a relation; resolving it is a configuration error.
    Value(Value),
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Relation(RelatedResult),
    Value(Value),
    Missing,
}

impl Resolved {
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Relation(result) => Some(result.to_json()),
            Self::Value(value) => Some(value),
            Self::Missing => None,
        }
    }
}

/// Looks up `name` on `entity`; see the module docs for the order.
///
/// # Errors
///
/// Returns `ApiError::Configuration` when `name` is a declared relationship
/// whose accessor is missing or does not return a relation, and a database
/// error when loading the relation fails.
pub async fn resolve(entity: &mut Entity, name: &str, store: &Store) -> Result<Resolved, ApiError> {
    if let Some(cached) = entity.relation(name) {
        return Ok(Resolved::Relation(cached.clone()));
    }

    if let Some(relation) = call_relationship(entity, name)? {
        let results = relation.get_results(store.repository()).await?;
        tracing::debug!(model = entity.model().name(), relation = name, "relation loaded");
        entity.set_relation(name, results.clone());
        return Ok(Resolved::Relation(results));
    }

    if let Some(value) = entity.computed(name) {
        return Ok(Resolved::Value(value));
    }

    Ok(entity
        .attribute(name)
        .cloned()
        .map_or(Resolved::Missing, Resolved::Value))
}

/// The lazy relation declared under `name`, without executing it.
///
/// `Ok(None)` means `name` is not a declared relationship.
///
/// # Errors
///
/// Returns `ApiError::Configuration` when the declared accessor does not
/// exist or returns something other than a relation.
pub fn call_relationship(entity: &Entity, name: &str) -> Result<Option<Relation>, ApiError> {
    let model = entity.model();
    let Some(descriptor) = model.relationship(name) else {
        return Ok(None);
    };
    let Some(accessor) = model.accessor(&descriptor.accessor) else {
        return Err(ApiError::configuration(
            model.name(),
            format!("{} has no method '{}'.", model.name(), descriptor.accessor),
        ));
    };

    match accessor(entity, &descriptor.parameters)? {
        Accessed::Relation(relation) => Ok(Some(relation)),
        Accessed::Value(_) => Err(ApiError::configuration(
            model.name(),
            format!("{}::{name} must return a relationship instance.", model.name()),
        )),
    }
}

/// `has_one`, `has_many`, `belongs_to` and `morph_one`, available on every
/// model type.
pub(crate) fn builtin_accessors() -> Vec<(&'static str, Accessor)> {
    vec![
        ("has_one", std::sync::Arc::new(has_one) as Accessor),
        ("has_many", std::sync::Arc::new(has_many) as Accessor),
        ("belongs_to", std::sync::Arc::new(belongs_to) as Accessor),
        ("morph_one", std::sync::Arc::new(morph_one) as Accessor),
    ]
}

/// The morph child declared with `ModelTypeBuilder::morph_one`.
fn morph_one(entity: &Entity, _parameters: &[String]) -> Result<Accessed, ApiError> {
    let model = entity.model();
    model
        .morph()
        .map(|morph| Accessed::Relation(morph.relation(entity)))
        .ok_or_else(|| {
            ApiError::configuration(
                model.name(),
                format!("{} declares no morph child.", model.name()),
            )
        })
}

/// `has_one:table,foreign_key[,local_key]`
fn has_one(entity: &Entity, parameters: &[String]) -> Result<Accessed, ApiError> {
    let (table, foreign_key, local_key) = keyed_parameters(entity, "has_one", parameters)?;
    let local_key = local_key.unwrap_or_else(|| entity.model().primary_key());
    Ok(Accessed::Relation(Relation::has_one(
        table,
        foreign_key,
        entity.attribute(local_key).cloned(),
    )))
}

/// `has_many:table,foreign_key[,local_key]`
fn has_many(entity: &Entity, parameters: &[String]) -> Result<Accessed, ApiError> {
    let (table, foreign_key, local_key) = keyed_parameters(entity, "has_many", parameters)?;
    let local_key = local_key.unwrap_or_else(|| entity.model().primary_key());
    Ok(Accessed::Relation(Relation::has_many(
        table,
        foreign_key,
        entity.attribute(local_key).cloned(),
    )))
}

/// `belongs_to:table,foreign_key[,owner_key]`
fn belongs_to(entity: &Entity, parameters: &[String]) -> Result<Accessed, ApiError> {
    let (table, foreign_key, owner_key) = keyed_parameters(entity, "belongs_to", parameters)?;
    Ok(Accessed::Relation(Relation::belongs_to(
        table,
        owner_key.unwrap_or("id"),
        entity.attribute(foreign_key).cloned(),
    )))
}

fn keyed_parameters<'p>(
    entity: &Entity,
    accessor: &str,
    parameters: &'p [String],
) -> Result<(&'p str, &'p str, Option<&'p str>), ApiError> {
    match parameters {
        [table, key] => Ok((table.as_str(), key.as_str(), None)),
        [table, key, other] => Ok((table.as_str(), key.as_str(), Some(other.as_str()))),
        _ => Err(ApiError::configuration(
            entity.model().name(),
            format!(
                "{}::{accessor} expects a related table, a key and an optional second key.",
                entity.model().name()
            ),
        )),
    }
}
