//! Model type definitions.
//!
//! A [`ModelType`] is everything an entity knows about its kind: table and
//! key, rules, relationships, accessors, computed getters, lifecycle
//! handlers and mass-assignment lists. Types are assembled once with
//! [`ModelTypeBuilder`] and shared behind an `Arc`.
//!
//! ```rust,ignore
//! let widget = ModelType::builder("Widget")
//!     .table("widgets")
//!     .rule("name", "required|string|max:40")
//!     .rule("owner_id", "foreign_int:users,id")
//!     .relationship("owner", "belongs_to", &["users", "owner_id"])
//!     .on(LifecycleEvent::Saving, |widget| {
//!         Propagation::from(widget.attribute("name").is_some())
//!     })
//!     .build();
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::entity::Entity;
use super::events::{EventDispatcher, LifecycleEvent, Propagation};
use super::morph::MorphDescriptor;
use super::relationships::{Accessed, RelationshipDescriptor, builtin_accessors};
use crate::errors::ApiError;
use crate::validation::{RuleSet, ValidationEngine};

pub type Accessor = Arc<dyn Fn(&Entity, &[String]) -> Result<Accessed, ApiError> + Send + Sync>;
pub type ComputedGetter = Arc<dyn Fn(&Entity) -> Value + Send + Sync>;

pub struct ModelType {
    name: String,
    table: String,
    primary_key: String,
    rules: RuleSet,
    relationships: HashMap<String, RelationshipDescriptor>,
    accessors: HashMap<String, Accessor>,
    computed: HashMap<String, ComputedGetter>,
    morph: Option<MorphDescriptor>,
    events: EventDispatcher<Entity>,
    fillable: Vec<String>,
    guarded: Vec<String>,
    validator: ValidationEngine,
    validate_on_save: bool,
    auto_hydrate: bool,
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut accessors: Vec<&str> = self.accessors.keys().map(String::as_str).collect();
        accessors.sort_unstable();
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("rules", &self.rules)
            .field("relationships", &self.relationships)
            .field("accessors", &accessors)
            .field("morph", &self.morph)
            .field("events", &self.events)
            .field("fillable", &self.fillable)
            .field("guarded", &self.guarded)
            .field("validate_on_save", &self.validate_on_save)
            .field("auto_hydrate", &self.auto_hydrate)
            .finish_non_exhaustive()
    }
}

impl ModelType {
    pub fn builder(name: impl Into<String>) -> ModelTypeBuilder {
        ModelTypeBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    #[must_use]
    pub fn validator(&self) -> &ValidationEngine {
        &self.validator
    }

    #[must_use]
    pub fn events(&self) -> &EventDispatcher<Entity> {
        &self.events
    }

    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.get(name)
    }

    #[must_use]
    pub fn relationship_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.relationships.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn accessor(&self, name: &str) -> Option<&Accessor> {
        self.accessors.get(name)
    }

    #[must_use]
    pub fn computed(&self, name: &str) -> Option<&ComputedGetter> {
        self.computed.get(name)
    }

    /// The morph-one child declaration, if any.
    #[must_use]
    pub fn morph(&self) -> Option<&MorphDescriptor> {
        self.morph.as_ref()
    }

    #[must_use]
    pub fn validates_on_save(&self) -> bool {
        self.validate_on_save
    }

    #[must_use]
    pub fn auto_hydrates(&self) -> bool {
        self.auto_hydrate
    }

    /// Mass-assignment check: listed in `fillable` when that list is set,
    /// otherwise not listed in `guarded`.
    #[must_use]
    pub fn is_fillable(&self, attribute: &str) -> bool {
        if self.fillable.is_empty() {
            !self.guarded.iter().any(|guarded| guarded == attribute || guarded == "*")
        } else {
            self.fillable.iter().any(|fillable| fillable == attribute)
        }
    }

    /// First parameter of the attribute's `max` rule, else of its `size` rule.
    #[must_use]
    pub fn attribute_max_value(&self, attribute: &str) -> Option<&str> {
        self.rules.attribute_max_value(attribute)
    }
}

pub struct ModelTypeBuilder {
    name: String,
    table: Option<String>,
    primary_key: String,
    rules: RuleSet,
    relationships: HashMap<String, RelationshipDescriptor>,
    accessors: HashMap<String, Accessor>,
    computed: HashMap<String, ComputedGetter>,
    morph: Option<MorphDescriptor>,
    events: EventDispatcher<Entity>,
    fillable: Vec<String>,
    guarded: Option<Vec<String>>,
    messages: HashMap<String, String>,
    validate_on_save: bool,
    auto_hydrate: bool,
}

impl ModelTypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            primary_key: "id".to_string(),
            rules: RuleSet::new(),
            relationships: HashMap::new(),
            accessors: builtin_accessors()
                .into_iter()
                .map(|(name, accessor)| (name.to_string(), accessor))
                .collect(),
            computed: HashMap::new(),
            morph: None,
            events: EventDispatcher::new(),
            fillable: Vec::new(),
            guarded: None,
            messages: HashMap::new(),
            validate_on_save: true,
            auto_hydrate: true,
        }
    }

    /// Defaults to the lowercased type name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    #[must_use]
    pub fn rule(mut self, attribute: impl Into<String>, rule_string: &str) -> Self {
        self.rules.insert(attribute, rule_string);
        self
    }

    #[must_use]
    pub fn relationship(mut self, name: impl Into<String>, accessor: &str, parameters: &[&str]) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDescriptor::new(accessor, parameters.iter().copied()),
        );
        self
    }

    #[must_use]
    pub fn accessor<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&Entity, &[String]) -> Result<Accessed, ApiError> + Send + Sync + 'static,
    {
        self.accessors.insert(name.into(), Arc::new(accessor));
        self
    }

    #[must_use]
    pub fn computed<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Entity) -> Value + Send + Sync + 'static,
    {
        self.computed.insert(name.into(), Arc::new(getter));
        self
    }

    /// Declares the morph-one child stored by `model`, keyed by
    /// `<morph_by>_id` and `<morph_by>_type`, and exposes it as the
    /// relationship `name`. A later declaration replaces an earlier one.
    #[must_use]
    pub fn morph_one(mut self, name: impl Into<String>, model: Arc<ModelType>, morph_by: &str) -> Self {
        let name = name.into();
        self.relationships.insert(
            name.clone(),
            RelationshipDescriptor::new("morph_one", std::iter::empty::<String>()),
        );
        self.morph = Some(MorphDescriptor::new(name, model, morph_by));
        self
    }

    #[must_use]
    pub fn on<F>(mut self, event: LifecycleEvent, handler: F) -> Self
    where
        F: Fn(&mut Entity) -> Propagation + Send + Sync + 'static,
    {
        self.events.register(event, handler);
        self
    }

    #[must_use]
    pub fn fillable(mut self, attributes: &[&str]) -> Self {
        self.fillable = attributes.iter().map(ToString::to_string).collect();
        self
    }

    /// Replaces the default guarded list (the primary key).
    #[must_use]
    pub fn guarded(mut self, attributes: &[&str]) -> Self {
        self.guarded = Some(attributes.iter().map(ToString::to_string).collect());
        self
    }

    /// Validation message override keyed `attribute.rule` or `rule`.
    #[must_use]
    pub fn message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(key.into(), message.into());
        self
    }

    #[must_use]
    pub fn validate_on_save(mut self, enabled: bool) -> Self {
        self.validate_on_save = enabled;
        self
    }

    #[must_use]
    pub fn auto_hydrate(mut self, enabled: bool) -> Self {
        self.auto_hydrate = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> ModelType {
        let mut events = EventDispatcher::new();
        if self.auto_hydrate {
            events.register(LifecycleEvent::Creating, |entity: &mut Entity| {
                entity.hydrate();
                Propagation::Continue
            });
        }
        events.extend(self.events);

        let guarded = self
            .guarded
            .unwrap_or_else(|| vec![self.primary_key.clone()]);

        ModelType {
            table: self.table.unwrap_or_else(|| self.name.to_lowercase()),
            name: self.name,
            primary_key: self.primary_key,
            rules: self.rules,
            relationships: self.relationships,
            accessors: self.accessors,
            computed: self.computed,
            morph: self.morph,
            events,
            fillable: self.fillable,
            guarded,
            validator: ValidationEngine::with_messages(self.messages),
            validate_on_save: self.validate_on_save,
            auto_hydrate: self.auto_hydrate,
        }
    }
}
