//! Active-record models and generic CRUD resources for Axum and Sea-ORM.
//!
//! - [`validation`]: pipe-delimited rule strings and the engine that runs them
//! - [`model`]: model types, entities, lifecycle events and dynamic
//!   relationships
//! - [`resource`]: the CRUD dispatcher, the `{data, errors, success}`
//!   envelope and the router that mounts it
//! - [`database`]: the repository port and its Sea-ORM implementation

pub mod config;
pub mod database;
pub mod errors;
pub mod model;
pub mod resource;
pub mod template;
pub mod validation;

pub use config::DispatcherConfig;
pub use database::{Query, Record, Repository, SeaOrmRepository};
pub use errors::ApiError;
pub use model::{Entity, LifecycleEvent, ModelType, Propagation, Store};
pub use resource::{
    Resource, ResourceDispatcher, ResourceRequest, ResponseEnvelope, Verb, resource_router,
};
pub use validation::{RuleSet, ValidationEngine, ValidationResult};

pub use async_trait::async_trait;
