use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    routing::get,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::dispatcher::{ResourceDispatcher, ResourceRequest, Resource, Responded, Verb};
use crate::database::Record;
use crate::errors::ApiError;

type Shared<R> = State<Arc<ResourceDispatcher<R>>>;

/// Mounts `dispatcher` on a router:
///
/// | Method           | Path    | Verb      |
/// |------------------|---------|-----------|
/// | `GET`            | `/`     | `index`   |
/// | `POST`           | `/`     | `store`   |
/// | `GET`            | `/{id}` | `show`    |
/// | `PUT` \| `PATCH` | `/{id}` | `update`  |
/// | `DELETE`         | `/{id}` | `destroy` |
///
/// Query parameters and a JSON object body are merged into the request
/// input, the body winning on conflicts. Nest the router to give it a
/// prefix.
pub fn resource_router<R: Resource + 'static>(dispatcher: ResourceDispatcher<R>) -> Router {
    Router::new()
        .route("/", get(index::<R>).post(store::<R>))
        .route(
            "/{id}",
            get(show::<R>)
                .put(update::<R>)
                .patch(update::<R>)
                .delete(destroy::<R>),
        )
        .with_state(Arc::new(dispatcher))
}

async fn index<R: Resource + 'static>(
    State(dispatcher): Shared<R>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Responded, ApiError> {
    let request = ResourceRequest::new().with_input(request_input(query, &[])?);
    dispatcher.dispatch(Verb::Index, request).await
}

async fn store<R: Resource + 'static>(
    State(dispatcher): Shared<R>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Responded, ApiError> {
    let request = ResourceRequest::new().with_input(request_input(query, &body)?);
    dispatcher.dispatch(Verb::Store, request).await
}

async fn show<R: Resource + 'static>(
    State(dispatcher): Shared<R>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Responded, ApiError> {
    let request = ResourceRequest::new()
        .with_id(parse_key(&id))
        .with_input(request_input(query, &[])?);
    dispatcher.dispatch(Verb::Show, request).await
}

async fn update<R: Resource + 'static>(
    State(dispatcher): Shared<R>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Responded, ApiError> {
    let request = ResourceRequest::new()
        .with_id(parse_key(&id))
        .with_input(request_input(query, &body)?);
    dispatcher.dispatch(Verb::Update, request).await
}

async fn destroy<R: Resource + 'static>(
    State(dispatcher): Shared<R>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Responded, ApiError> {
    let request = ResourceRequest::new()
        .with_id(parse_key(&id))
        .with_input(request_input(query, &[])?);
    dispatcher.dispatch(Verb::Destroy, request).await
}

/// Integer-looking path segments become numbers, everything else a string.
fn parse_key(segment: &str) -> Value {
    segment
        .parse::<i64>()
        .map_or_else(|_| Value::String(segment.to_string()), Value::from)
}

fn request_input(query: HashMap<String, String>, body: &[u8]) -> Result<Record, ApiError> {
    let mut input: Record = query
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(input);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => {
            input.extend(fields);
            Ok(input)
        }
        Ok(_) => Err(ApiError::bad_request("Request body must be a JSON object.")),
        Err(err) => {
            tracing::debug!(error = %err, "unreadable request body");
            Err(ApiError::bad_request("Request body is not valid JSON."))
        }
    }
}
