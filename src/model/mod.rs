//! Active-record models.
//!
//! A [`ModelType`] describes a kind of record; an [`Entity`] is one record of
//! it. Entities validate themselves on save, fire [`LifecycleEvent`]s around
//! every write, auto-hydrate from request input, resolve declared
//! relationships by name and cascade writes to a morph-one child. All I/O goes through a [`Store`].

pub mod definition;
pub mod entity;
pub mod events;
pub mod morph;
pub mod query;
pub mod registry;
pub mod relationships;
pub mod store;

pub use definition::{Accessor, ComputedGetter, ModelType, ModelTypeBuilder};
pub use entity::Entity;
pub use events::{EventDispatcher, EventHandler, LifecycleEvent, Propagation};
pub use morph::MorphDescriptor;
pub use query::QueryHandle;
pub use registry::{ColumnCache, ModelRegistry};
pub use relationships::{
    Accessed, RelatedResult, Relation, RelationKind, RelationshipDescriptor, Resolved,
    call_relationship, resolve,
};
pub use store::Store;
