//! Shared harness for integration tests: application state backed by an
//! in-memory SQLite database, a router wired like the production binary, and
//! seed helpers for products and BOM inputs.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use bomworks_api::{
    config::AppConfig,
    db,
    entities::bom_header::BomStatus,
    events::{self, EventSender},
    handlers::AppServices,
    services::boms::{BomComponentInput, BomDetail, CreateBomInput},
    services::products::CreateProductInput,
    AppState,
};

/// Helper harness for spinning up an application state backed by an in-memory
/// SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application after tweaking the default configuration.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single pooled connection keeps the in-memory database alive for
        // the lifetime of the harness and serializes concurrent writers.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", bomworks_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Insert a product directly through the service layer and return its id.
    pub async fn seed_product(&self, sku: &str, name: &str) -> Uuid {
        self.state
            .services
            .products
            .create_product(CreateProductInput {
                sku: sku.to_string(),
                name: name.to_string(),
                description: None,
            })
            .await
            .expect("seed product for tests")
            .id
    }

    /// Create and activate a BOM for a product in one step.
    pub async fn seed_active_bom(
        &self,
        product_id: Uuid,
        name: &str,
        components: Vec<BomComponentInput>,
    ) -> BomDetail {
        let mut input = bom_input(product_id, name, components);
        input.status = Some(BomStatus::Active);
        self.state
            .services
            .boms
            .create_bom(input)
            .await
            .expect("seed active bom for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Read a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body was not valid json")
}

/// Parse a decimal out of a JSON field, accepting string and number encodings.
pub fn decimal_field(value: &Value, key: &str) -> Decimal {
    match &value[key] {
        Value::String(s) => s
            .parse()
            .unwrap_or_else(|_| panic!("field {} was not a decimal: {}", key, s)),
        Value::Number(n) => n
            .to_string()
            .parse()
            .unwrap_or_else(|_| panic!("field {} was out of decimal range: {}", key, n)),
        other => panic!("field {} was not a decimal: {}", key, other),
    }
}

/// A component row with only the required fields filled in.
pub fn component(product_id: Uuid, quantity: Decimal, unit_cost: Decimal) -> BomComponentInput {
    BomComponentInput {
        component_product_id: product_id,
        quantity_required: quantity,
        unit_of_measure: None,
        waste_percentage: None,
        unit_cost: Some(unit_cost),
        supplier_id: None,
        notes: None,
    }
}

/// A create input for one product with the given component rows.
pub fn bom_input(
    product_id: Uuid,
    name: &str,
    components: Vec<BomComponentInput>,
) -> CreateBomInput {
    CreateBomInput {
        product_id,
        name: name.to_string(),
        description: None,
        bom_number: None,
        status: None,
        labor_cost: None,
        overhead_cost: None,
        total_quantity: None,
        unit_of_measure: None,
        created_by: None,
        notes: None,
        components,
    }
}
