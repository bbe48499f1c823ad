//! Generic CRUD resources: the dispatcher, its envelope, pagination and the
//! axum router.

pub mod dispatcher;
pub mod envelope;
pub mod pagination;
pub mod router;

pub use dispatcher::{
    DispatchContext, IndexShape, Resource, ResourceDispatcher, ResourceRequest, Responded, Verb,
    default_index, find_requested,
};
pub use envelope::{Bag, EnvelopeSchema, ResponseEnvelope};
pub use pagination::{Page, PageParams};
pub use router::resource_router;
