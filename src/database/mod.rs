//! Data access: the backend-neutral [`Query`], the [`Repository`] port and
//! its Sea-ORM implementation.

pub mod query;
pub mod repository;
pub mod sea;

pub use query::{Condition, Direction, Operator, Query};
pub use repository::{Record, Repository};
pub use sea::SeaOrmRepository;
