//! # Resource Dispatch
//!
//! [`ResourceDispatcher`] runs one verb of a [`Resource`] through the
//! phases `Before → Main → After → Responded`:
//!
//! - **Before**: the resource's `before_<verb>` hook. Errors it adds to the
//!   envelope skip `Main`.
//! - **Main**: the verb itself, overridable per resource.
//! - **After**: `after_<verb>`, only when no errors occurred. It sees the
//!   finished envelope but cannot change it.
//! - **Responded**: the envelope with its status code.
//!
//! Errors returned from any phase are folded into the envelope at the
//! dispatch boundary. Configuration errors are the exception: they are
//! logged and returned as `Err`.
//!
//! ```rust,ignore
//! struct Widgets(Arc<ModelType>);
//!
//! #[async_trait]
//! impl Resource for Widgets {
//!     fn model(&self) -> Arc<ModelType> {
//!         Arc::clone(&self.0)
//!     }
//!
//!     async fn before_destroy(
//!         &self,
//!         request: &mut ResourceRequest,
//!         envelope: &mut ResponseEnvelope,
//!     ) -> Result<(), ApiError> {
//!         envelope.add_error("forbidden", "Widgets are permanent.");
//!         envelope.set_status(StatusCode::FORBIDDEN);
//!         Ok(())
//!     }
//! }
//!
//! let dispatcher = ResourceDispatcher::new(Widgets(widget_type), store);
//! let responded = dispatcher.dispatch(Verb::Show, ResourceRequest::new().with_id(json!(7))).await?;
//! ```

use async_trait::async_trait;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::envelope::ResponseEnvelope;
use super::pagination::PageParams;
use crate::config::DispatcherConfig;
use crate::database::{Query, Record};
use crate::errors::ApiError;
use crate::model::query::display_key;
use crate::model::{Entity, ModelType, Store};
use crate::template::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Index,
    Show,
    /// Also reachable as `create`
    Store,
    /// Also reachable as `edit`
    Update,
    /// Also reachable as `delete`
    Destroy,
}

impl Verb {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Show => "show",
            Self::Store => "store",
            Self::Update => "update",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Verb {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(Self::Index),
            "show" => Ok(Self::Show),
            "store" | "create" => Ok(Self::Store),
            "update" | "edit" => Ok(Self::Update),
            "destroy" | "delete" => Ok(Self::Destroy),
            other => Err(ApiError::bad_request(format!("Unknown verb '{other}'."))),
        }
    }
}

/// What `index` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexShape {
    #[default]
    Collection,
    /// The first matching entity, or `null`
    First,
}

/// One inbound request, transport-independent.
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    /// Primary key for show/update/destroy
    pub id: Option<Value>,
    /// Query parameters merged with the body
    pub input: Record,
    pub page: PageParams,
}

impl ResourceRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the input and reads the pagination parameters out of it.
    #[must_use]
    pub fn with_input(mut self, input: Record) -> Self {
        self.page = PageParams::from_input(&input);
        self.input = input;
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: PageParams) -> Self {
        self.page = page;
        self
    }
}

/// What the verbs get to work with.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub store: &'a Store,
    pub config: &'a DispatcherConfig,
}

/// A CRUD resource over one model type.
///
/// Every method has a default; implement `model` and override only what the
/// resource needs.
#[async_trait]
pub trait Resource: Send + Sync {
    fn model(&self) -> Arc<ModelType>;

    fn index_shape(&self) -> IndexShape {
        IndexShape::Collection
    }

    /// Adjusts the paginated index query (filters, ordering, grouping).
    async fn index_query(&self, query: Query, _request: &ResourceRequest) -> Result<Query, ApiError> {
        Ok(query)
    }

    // ==========================================
    // BEFORE HOOKS
    // ==========================================

    async fn before_index(
        &self,
        _request: &mut ResourceRequest,
        _envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn before_show(
        &self,
        _request: &mut ResourceRequest,
        _envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn before_store(
        &self,
        _request: &mut ResourceRequest,
        _envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn before_update(
        &self,
        _request: &mut ResourceRequest,
        _envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn before_destroy(
        &self,
        _request: &mut ResourceRequest,
        _envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    // ==========================================
    // MAIN
    // ==========================================

    async fn index(
        &self,
        cx: DispatchContext<'_>,
        request: &ResourceRequest,
        envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        default_index(self, cx, request, envelope).await
    }

    async fn show(
        &self,
        cx: DispatchContext<'_>,
        request: &ResourceRequest,
        envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        let entity = find_requested(self, cx, request).await?;
        envelope.add_data(&cx.config.entity_key, entity.to_json());
        Ok(())
    }

    async fn store(
        &self,
        cx: DispatchContext<'_>,
        request: &ResourceRequest,
        envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        let model = self.model();
        let input = cx.store.restrict_to_columns(&model, &request.input).await?;
        let mut entity = Entity::from_input(model, input.clone());
        entity.fill(&input);
        save_and_report(cx, &mut entity, envelope).await
    }

    async fn update(
        &self,
        cx: DispatchContext<'_>,
        request: &ResourceRequest,
        envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        let mut entity = find_requested(self, cx, request).await?;
        let input = cx
            .store
            .restrict_to_columns(entity.model(), &request.input)
            .await?;
        entity.fill(&input);
        save_and_report(cx, &mut entity, envelope).await
    }

    async fn destroy(
        &self,
        cx: DispatchContext<'_>,
        request: &ResourceRequest,
        envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        let mut entity = find_requested(self, cx, request).await?;
        let input = cx
            .store
            .restrict_to_columns(entity.model(), &request.input)
            .await?;
        entity.fill(&input);
        entity.set_input(request.input.clone());
        if entity.delete(cx.store).await? {
            envelope.add_data(&cx.config.entity_key, entity.to_json());
            return Ok(());
        }
        if entity.has_errors() {
            return Err(ApiError::validation_failed(entity.errors().clone()));
        }
        Err(ApiError::bad_request(render(
            cx.config.message("not_deleted"),
            &[("class", entity.model().name())],
        )))
    }

    // ==========================================
    // AFTER HOOKS
    // ==========================================

    async fn after_index(
        &self,
        _request: &ResourceRequest,
        _envelope: &ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn after_show(
        &self,
        _request: &ResourceRequest,
        _envelope: &ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn after_store(
        &self,
        _request: &ResourceRequest,
        _envelope: &ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn after_update(
        &self,
        _request: &ResourceRequest,
        _envelope: &ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn after_destroy(
        &self,
        _request: &ResourceRequest,
        _envelope: &ResponseEnvelope,
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Paginates, lets the resource adjust the query, then loads the
/// collection (or first entity) under the results key.
///
/// # Errors
///
/// Returns an `ApiError` when the query hook or the repository fails.
pub async fn default_index<R: Resource + ?Sized>(
    resource: &R,
    cx: DispatchContext<'_>,
    request: &ResourceRequest,
    envelope: &mut ResponseEnvelope,
) -> Result<(), ApiError> {
    let model = resource.model();
    let page = request.page.resolve(cx.config);
    let query = Query::table(model.table())
        .skip(page.offset)
        .take(page.limit);
    let query = resource.index_query(query, request).await?;
    let handle = cx.store.query(&model).with_query(query);

    let results = match resource.index_shape() {
        IndexShape::Collection => {
            Value::Array(handle.get().await?.iter().map(Entity::to_json).collect())
        }
        IndexShape::First => handle
            .first()
            .await?
            .map_or(Value::Null, |entity| entity.to_json()),
    };
    envelope.add_data(&cx.config.results_key, results);
    Ok(())
}

/// The entity named by `request.id`.
///
/// # Errors
///
/// Returns `ApiError::NotFound` rendered from the `not_found` template when
/// no row has that key, and `ApiError::BadRequest` when the request has no
/// key at all.
pub async fn find_requested<R: Resource + ?Sized>(
    resource: &R,
    cx: DispatchContext<'_>,
    request: &ResourceRequest,
) -> Result<Entity, ApiError> {
    let model = resource.model();
    let Some(id) = request.id.clone() else {
        return Err(ApiError::bad_request(render(
            cx.config.message("missing_id"),
            &[("class", model.name())],
        )));
    };

    let shown = display_key(&id);
    cx.store.query(&model).find(id).await?.ok_or_else(|| {
        ApiError::not_found(render(
            cx.config.message("not_found"),
            &[("val", shown.as_str()), ("class", model.name())],
        ))
    })
}

async fn save_and_report(
    cx: DispatchContext<'_>,
    entity: &mut Entity,
    envelope: &mut ResponseEnvelope,
) -> Result<(), ApiError> {
    if entity.save(cx.store).await? {
        envelope.add_data(&cx.config.entity_key, entity.to_json());
        return Ok(());
    }
    if entity.has_errors() {
        return Err(ApiError::validation_failed(entity.errors().clone()));
    }
    Err(ApiError::bad_request(render(
        cx.config.message("not_saved"),
        &[("class", entity.model().name())],
    )))
}

/// A finished dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Responded {
    pub status: StatusCode,
    pub envelope: ResponseEnvelope,
}

impl Responded {
    #[must_use]
    pub fn new(envelope: ResponseEnvelope) -> Self {
        Self {
            status: envelope.status_code(),
            envelope,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        self.envelope.to_json()
    }
}

impl IntoResponse for Responded {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

pub struct ResourceDispatcher<R> {
    resource: R,
    store: Store,
    config: DispatcherConfig,
}

impl<R: fmt::Debug> fmt::Debug for ResourceDispatcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDispatcher")
            .field("resource", &self.resource)
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

impl<R: Resource> ResourceDispatcher<R> {
    pub fn new(resource: R, store: Store) -> Self {
        Self {
            resource,
            store,
            config: DispatcherConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs `verb` and returns the envelope with its status.
    ///
    /// # Errors
    ///
    /// Only `ApiError::Configuration` is returned; every other error ends up
    /// in the envelope.
    pub async fn dispatch(
        &self,
        verb: Verb,
        mut request: ResourceRequest,
    ) -> Result<Responded, ApiError> {
        let mut envelope = ResponseEnvelope::new();
        let model = self.resource.model();
        tracing::debug!(model = model.name(), verb = %verb, "dispatching");

        if let Err(err) = self.run(verb, &mut request, &mut envelope).await {
            if err.is_configuration() {
                err.log_internal();
                return Err(err);
            }
            if let ApiError::Domain { category, .. } = &err {
                envelope.set_status_if_unset(self.config.status_for(category));
            }
            err.record(&mut envelope);
        }

        let responded = Responded::new(envelope);
        tracing::debug!(
            model = model.name(),
            verb = %verb,
            status = %responded.status,
            "responded"
        );
        Ok(responded)
    }

    async fn run(
        &self,
        verb: Verb,
        request: &mut ResourceRequest,
        envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        let resource = &self.resource;
        match verb {
            Verb::Index => resource.before_index(request, envelope).await?,
            Verb::Show => resource.before_show(request, envelope).await?,
            Verb::Store => resource.before_store(request, envelope).await?,
            Verb::Update => resource.before_update(request, envelope).await?,
            Verb::Destroy => resource.before_destroy(request, envelope).await?,
        }
        if envelope.has_errors() {
            tracing::debug!(verb = %verb, "before hook rejected the request");
            return Ok(());
        }

        let cx = DispatchContext {
            store: &self.store,
            config: &self.config,
        };
        let request = &*request;
        match verb {
            Verb::Index => resource.index(cx, request, envelope).await?,
            Verb::Show => resource.show(cx, request, envelope).await?,
            Verb::Store => resource.store(cx, request, envelope).await?,
            Verb::Update => resource.update(cx, request, envelope).await?,
            Verb::Destroy => resource.destroy(cx, request, envelope).await?,
        }
        if envelope.has_errors() {
            return Ok(());
        }

        match verb {
            Verb::Index => resource.after_index(request, envelope).await,
            Verb::Show => resource.after_show(request, envelope).await,
            Verb::Store => resource.after_store(request, envelope).await,
            Verb::Update => resource.after_update(request, envelope).await,
            Verb::Destroy => resource.after_destroy(request, envelope).await,
        }
    }
}
