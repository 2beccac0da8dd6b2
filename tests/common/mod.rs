use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    middleware, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, NotSet, Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use salesdesk_api::{
    config::{AppConfig, OrderPolicyConfig},
    db,
    entities::{
        order::{self, OrderStatus},
        order_item, user, user_location,
    },
    erp::ErpClient,
    events,
    handlers::AppServices,
    AppState,
};

/// Test harness: the real router over a tempfile-backed SQLite database,
/// with the ERP stood in by a wiremock server. The token endpoint is
/// mounted up front; directory collections are mounted per test.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub erp: MockServer,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    /// Construct a test application with the default order policy.
    pub async fn new() -> Self {
        Self::with_policy(OrderPolicyConfig::default()).await
    }

    /// Construct a test application with explicit policy switches.
    pub async fn with_policy(policy: OrderPolicyConfig) -> Self {
        let erp = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "test-token",
                "expires_in": 3600
            })))
            .mount(&erp)
            .await;

        let db_dir = TempDir::new().expect("create temp dir for sqlite");
        let db_path = db_dir.path().join("salesdesk_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.order_policy = policy;
        cfg.erp.base_url = erp.uri();
        cfg.erp.token_url = format!("{}/token", erp.uri());
        cfg.erp.client_secret = "test-secret".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("create test database");
        db::run_migrations(&pool).await.expect("run migrations");
        let db_arc = Arc::new(pool);

        let (event_sender, event_rx) = events::channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let erp_client = Arc::new(ErpClient::new(cfg.erp.clone()).expect("build erp client"));
        let services = AppServices::new(
            db_arc.clone(),
            erp_client,
            cfg.order_policy,
            Some(Arc::new(event_sender.clone())),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", salesdesk_api::api_v1_routes())
            .layer(middleware::from_fn(
                salesdesk_api::tracing::propagate_request_id,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            erp,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Mounts an ERP directory collection under its OData envelope.
    pub async fn mount_collection(&self, collection: &str, rows: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/{}", collection)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": rows })))
            .mount(&self.erp)
            .await;
    }

    /// Makes an ERP collection fetch fail with the given status.
    pub async fn mount_collection_failure(&self, collection: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/{}", collection)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.erp)
            .await;
    }

    /// The ERP accepts sales-order pushes and answers with a document number.
    pub async fn mount_sales_order_post(&self, document_no: &str) {
        Mock::given(method("POST"))
            .and(path("/SalesOrders"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "no": document_no })))
            .mount(&self.erp)
            .await;
    }

    /// The ERP rejects sales-order pushes with the given status.
    pub async fn mount_sales_order_post_failure(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/SalesOrders"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.erp)
            .await;
    }

    /// Seeds an active user and returns its id.
    pub async fn seed_user(&self, role: &str, salesperson_code: Option<&str>) -> Uuid {
        self.insert_user(role, salesperson_code, true).await
    }

    /// Seeds a deactivated user, which the services must treat as absent.
    pub async fn seed_inactive_user(&self, role: &str, salesperson_code: Option<&str>) -> Uuid {
        self.insert_user(role, salesperson_code, false).await
    }

    async fn insert_user(&self, role: &str, salesperson_code: Option<&str>, active: bool) -> Uuid {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            email: Set(format!("{}@salesdesk.test", id.simple())),
            full_name: Set("Test User".to_string()),
            role: Set(role.to_string()),
            salesperson_code: Set(salesperson_code.map(str::to_string)),
            active: Set(active),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user");
        id
    }

    /// Restricts a user to a location. Users without rows stay unrestricted.
    pub async fn assign_location(&self, user_id: Uuid, location_code: &str) {
        user_location::ActiveModel {
            user_id: Set(user_id),
            location_code: Set(location_code.to_string()),
        }
        .insert(&*self.state.db)
        .await
        .expect("assign user location");
    }

    /// Inserts an order directly, bypassing submission, for transition and
    /// reporting tests that need a starting status.
    pub async fn seed_order(
        &self,
        customer_code: &str,
        location_code: &str,
        salesperson_code: &str,
        status: OrderStatus,
        total_amount: Decimal,
        order_date: DateTime<Utc>,
    ) -> i64 {
        let inserted = order::ActiveModel {
            order_number: NotSet,
            customer_code: Set(customer_code.to_string()),
            location_code: Set(location_code.to_string()),
            salesperson_code: Set(salesperson_code.to_string()),
            status: Set(status),
            order_date: Set(order_date),
            requested_delivery_date: Set(None),
            note: Set(None),
            total_amount: Set(total_amount),
            version: Set(1),
            created_by: Set(Uuid::new_v4()),
            created_at: Set(order_date),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order");
        inserted.order_number
    }

    /// Inserts a line for a seeded order.
    pub async fn seed_order_item(
        &self,
        order_number: i64,
        item_no: &str,
        location_code: &str,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> i64 {
        let inserted = order_item::ActiveModel {
            id: NotSet,
            order_number: Set(order_number),
            item_no: Set(item_no.to_string()),
            description: Set(format!("Item {}", item_no)),
            location_code: Set(location_code.to_string()),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            discount_percent: Set(Decimal::ZERO),
            line_amount: Set(quantity * unit_price),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order item");
        inserted.id
    }

    /// Reads an order back for assertions.
    pub async fn order(&self, order_number: i64) -> order::Model {
        order::Entity::find_by_id(order_number)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order should exist")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Directory fixtures in the ERP's wire shape.
#[allow(dead_code)]
pub fn customer_json(
    no: &str,
    name: &str,
    credit_allowed: bool,
    credit_limit: &str,
    balance: &str,
    salesperson_code: &str,
) -> Value {
    json!({
        "no": no,
        "name": name,
        "creditAllowed": credit_allowed,
        "creditLimit": credit_limit,
        "balance": balance,
        "paymentTermsCode": "30D",
        "paymentMethodCode": "BANK",
        "salespersonCode": salesperson_code
    })
}

#[allow(dead_code)]
pub fn inventory_json(item_no: &str, location_code: &str, quantity: &str) -> Value {
    json!({
        "itemNo": item_no,
        "locationCode": location_code,
        "quantity": quantity
    })
}

#[allow(dead_code)]
pub fn location_json(code: &str, name: &str) -> Value {
    json!({ "code": code, "name": name })
}

#[allow(dead_code)]
pub fn salesperson_json(code: &str, name: &str) -> Value {
    json!({ "code": code, "name": name })
}

#[allow(dead_code)]
pub fn invoice_line_json(
    document_no: &str,
    customer_no: &str,
    order_no: &str,
    item_no: &str,
    quantity: &str,
    unit_price: &str,
    line_amount: &str,
) -> Value {
    json!({
        "documentNo": document_no,
        "sellToCustomerNo": customer_no,
        "orderNo": order_no,
        "postingDate": "2024-03-05",
        "itemNo": item_no,
        "description": format!("Item {}", item_no),
        "quantity": quantity,
        "unitPrice": unit_price,
        "lineAmount": line_amount
    })
}
