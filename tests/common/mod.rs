#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use modelkit::database::{Direction, Operator};
use modelkit::model::{LifecycleEvent, ModelType, Propagation, Store};
use modelkit::resource::{
    DispatchContext, IndexShape, Resource, ResourceDispatcher, ResourceRequest, ResponseEnvelope,
    find_requested,
};
use modelkit::{ApiError, DispatcherConfig, Query, SeaOrmRepository, resource_router};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect("sqlite::memory:").await?;

    db.execute_unprepared(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
    )
    .await?;
    db.execute_unprepared(
        "CREATE TABLE widgets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            price REAL,
            owner_id INTEGER
        )",
    )
    .await?;
    db.execute_unprepared(
        "CREATE TABLE comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            widget_id INTEGER NOT NULL,
            body TEXT NOT NULL
        )",
    )
    .await?;
    db.execute_unprepared("INSERT INTO users (name) VALUES ('alice'), ('bob')")
        .await?;

    Ok(db)
}

pub fn widget_type() -> Arc<ModelType> {
    Arc::new(
        ModelType::builder("Widget")
            .table("widgets")
            .rule("name", "required|string|max:40")
            .rule("price", "nullable|numeric|min:0")
            .rule("owner_id", "nullable|foreign_int:users,id")
            .relationship("owner", "belongs_to", &["users", "owner_id"])
            .relationship("comments", "has_many", &["comments", "widget_id"])
            .relationship("maker", "maker_accessor", &[])
            .on(LifecycleEvent::Saving, |widget| {
                Propagation::from(widget.attribute("name") != Some(&json!("halt")))
            })
            .build(),
    )
}

/// Widget resource with switchable behavior for the tests.
#[derive(Default)]
pub struct WidgetResource {
    pub model: Option<Arc<ModelType>>,
    /// Relationships resolved by `show`
    pub eager: Vec<&'static str>,
    /// `before_destroy` rejects every request
    pub locked: bool,
    pub shape: IndexShape,
    pub after_calls: AtomicUsize,
}

impl WidgetResource {
    pub fn new() -> Self {
        Self {
            model: Some(widget_type()),
            ..Self::default()
        }
    }

    pub fn after_calls(&self) -> usize {
        self.after_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resource for WidgetResource {
    fn model(&self) -> Arc<ModelType> {
        self.model.clone().unwrap_or_else(widget_type)
    }

    fn index_shape(&self) -> IndexShape {
        self.shape
    }

    async fn index_query(&self, query: Query, request: &ResourceRequest) -> Result<Query, ApiError> {
        let query = match request.input.get("min_price") {
            Some(Value::String(min)) => {
                let min: f64 = min
                    .parse()
                    .map_err(|_| ApiError::bad_request("min_price must be a number"))?;
                query.where_op("price", Operator::Gte, json!(min))
            }
            _ => query,
        };
        Ok(query.order_by("id", Direction::Asc))
    }

    async fn before_store(
        &self,
        request: &mut ResourceRequest,
        _envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        if request.input.get("name") == Some(&json!("over-quota")) {
            return Err(ApiError::domain("quota", "Widget limit reached."));
        }
        Ok(())
    }

    async fn before_destroy(
        &self,
        _request: &mut ResourceRequest,
        envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        if self.locked {
            envelope.add_error("locked", "Widgets are locked.");
            envelope.set_status(StatusCode::FORBIDDEN);
        }
        Ok(())
    }

    async fn show(
        &self,
        cx: DispatchContext<'_>,
        request: &ResourceRequest,
        envelope: &mut ResponseEnvelope,
    ) -> Result<(), ApiError> {
        let mut entity = find_requested(self, cx, request).await?;
        for name in &self.eager {
            entity.resolve(name, cx.store).await?;
        }
        envelope.add_data(&cx.config.entity_key, entity.to_json());
        Ok(())
    }

    async fn after_store(
        &self,
        _request: &ResourceRequest,
        _envelope: &ResponseEnvelope,
    ) -> Result<(), ApiError> {
        self.after_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn config() -> DispatcherConfig {
    DispatcherConfig::default().with_exception_status("quota", StatusCode::TOO_MANY_REQUESTS)
}

pub fn dispatcher(db: &DatabaseConnection, resource: WidgetResource) -> ResourceDispatcher<WidgetResource> {
    let store = Store::new(SeaOrmRepository::new(db.clone()));
    ResourceDispatcher::new(resource, store).with_config(config())
}

pub fn setup_test_app(db: &DatabaseConnection, resource: WidgetResource) -> Router {
    Router::new().nest("/api/v1/widgets", resource_router(dispatcher(db, resource)))
}

pub fn input(value: Value) -> modelkit::Record {
    value.as_object().cloned().unwrap_or_default()
}

pub async fn insert_widget(db: &DatabaseConnection, name: &str, price: f64) -> Result<(), DbErr> {
    db.execute_unprepared(&format!(
        "INSERT INTO widgets (name, price) VALUES ('{name}', {price})"
    ))
    .await?;
    Ok(())
}

/// Sends one request through `app` and returns the status and JSON body.
pub async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
