//! The transition table and its guards: ERP push before Processing
//! commits, posted-invoice evidence before Delivered, version conflicts
//! and terminal idempotence.

mod common;

use axum::body;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::TestApp;
use salesdesk_api::entities::order::OrderStatus;

async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("parse json response")
}

fn status_payload(user_id: Uuid, new_status: &str) -> Value {
    json!({
        "user_id": user_id.to_string(),
        "new_status": new_status
    })
}

async fn seed_pending_order(app: &TestApp) -> i64 {
    let order_number = app
        .seed_order(
            "CUST-01",
            "MAIN",
            "SP-07",
            OrderStatus::Pending,
            dec!(99.98),
            Utc::now(),
        )
        .await;
    app.seed_order_item(order_number, "ITEM-1", "MAIN", dec!(2), dec!(49.99))
        .await;
    order_number
}

async fn mount_push_directory(app: &TestApp) {
    app.mount_collection(
        "Customers",
        json!([common::customer_json(
            "CUST-01", "Contoso Ltd", true, "5000.00", "0.00", "SP-07"
        )]),
    )
    .await;
    app.mount_collection(
        "Locations",
        json!([common::location_json("MAIN", "Main warehouse")]),
    )
    .await;
}

#[tokio::test]
async fn moving_to_processing_pushes_the_order_to_the_erp() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = seed_pending_order(&app).await;

    mount_push_directory(&app).await;
    // The push must carry the local order number as the external document
    // reference; that is the hook reconciliation joins on later.
    Mock::given(method("POST"))
        .and(path("/SalesOrders"))
        .and(body_partial_json(
            json!({ "externalDocumentNumber": order_number.to_string() }),
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "no": "SO-1042" })))
        .expect(1)
        .mount(&app.erp)
        .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Processing")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Processing");
    assert_eq!(body["data"]["version"], json!(2));
    assert_eq!(body["data"]["erp_document_no"], "SO-1042");

    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Processing);
    assert_eq!(saved.version, 2);
}

#[tokio::test]
async fn failed_erp_push_leaves_the_order_pending() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = seed_pending_order(&app).await;

    mount_push_directory(&app).await;
    app.mount_sales_order_post_failure(500).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Processing")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // The local commit never ran.
    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Pending);
    assert_eq!(saved.version, 1);
}

#[tokio::test]
async fn vanished_upstream_customer_blocks_the_push() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = seed_pending_order(&app).await;

    app.mount_collection("Customers", json!([])).await;
    app.mount_collection(
        "Locations",
        json!([common::location_json("MAIN", "Main warehouse")]),
    )
    .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Processing")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Pending);
}

#[tokio::test]
async fn skipping_processing_lists_the_allowed_transitions() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = seed_pending_order(&app).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Delivered")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    let message = body["message"].as_str().expect("error message");
    assert!(message.contains("Processing, Rejected"), "got: {message}");

    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Pending);
}

#[tokio::test]
async fn delivering_requires_a_posted_invoice() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = app
        .seed_order(
            "CUST-01",
            "MAIN",
            "SP-07",
            OrderStatus::Processing,
            dec!(99.98),
            Utc::now(),
        )
        .await;

    // Posted invoices exist, but none reference this order.
    app.mount_collection(
        "PostedSalesInvoiceLines",
        json!([
            common::invoice_line_json("PI-0900", "CUST-01", "999999", "ITEM-1", "1", "10.00", "10.00"),
            common::invoice_line_json("PI-0901", "CUST-01", "abc", "ITEM-1", "1", "10.00", "10.00")
        ]),
    )
    .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Delivered")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(response).await;
    let message = body["message"].as_str().expect("error message");
    assert!(message.contains("not invoiced"), "got: {message}");

    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Processing);
}

#[tokio::test]
async fn delivering_succeeds_once_the_invoice_is_posted() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = app
        .seed_order(
            "CUST-01",
            "MAIN",
            "SP-07",
            OrderStatus::Processing,
            dec!(99.98),
            Utc::now(),
        )
        .await;

    app.mount_collection(
        "PostedSalesInvoiceLines",
        json!([common::invoice_line_json(
            "PI-1001",
            "CUST-01",
            &order_number.to_string(),
            "ITEM-1",
            "2",
            "49.99",
            "99.98"
        )]),
    )
    .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Delivered")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Delivered");
    assert_eq!(body["data"]["version"], json!(2));

    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Delivered);
    assert_eq!(saved.version, 2);
}

#[tokio::test]
async fn invoice_fetch_failure_propagates_instead_of_reading_as_uninvoiced() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = app
        .seed_order(
            "CUST-01",
            "MAIN",
            "SP-07",
            OrderStatus::Processing,
            dec!(99.98),
            Utc::now(),
        )
        .await;

    app.mount_collection_failure("PostedSalesInvoiceLines", 500)
        .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Delivered")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Processing);
}

#[tokio::test]
async fn reapplying_a_terminal_status_is_a_noop() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = app
        .seed_order(
            "CUST-01",
            "MAIN",
            "SP-07",
            OrderStatus::Delivered,
            dec!(99.98),
            Utc::now(),
        )
        .await;

    // No invoice mock is mounted: the no-op path must not consult the ERP.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Delivered")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Delivered");
    assert_eq!(body["data"]["version"], json!(1));

    let saved = app.order(order_number).await;
    assert_eq!(saved.version, 1);
}

#[tokio::test]
async fn terminal_statuses_allow_no_further_transitions() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = app
        .seed_order(
            "CUST-01",
            "MAIN",
            "SP-07",
            OrderStatus::Rejected,
            dec!(99.98),
            Utc::now(),
        )
        .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(user_id, "Processing")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    let message = body["message"].as_str().expect("error message");
    assert!(message.contains("terminal"), "got: {message}");
}

#[tokio::test]
async fn rejection_needs_no_erp_involvement() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;

    let pending = seed_pending_order(&app).await;
    let processing = app
        .seed_order(
            "CUST-02",
            "MAIN",
            "SP-07",
            OrderStatus::Processing,
            dec!(50.00),
            Utc::now(),
        )
        .await;

    for order_number in [pending, processing] {
        let response = app
            .request(
                Method::PUT,
                &format!("/api/v1/orders/{order_number}/status"),
                Some(status_payload(user_id, "Rejected")),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let saved = app.order(order_number).await;
        assert_eq!(saved.status, OrderStatus::Rejected);
        assert_eq!(saved.version, 2);
    }
}

#[tokio::test]
async fn stale_version_reads_as_a_conflict() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = seed_pending_order(&app).await;

    let stale = json!({
        "user_id": user_id.to_string(),
        "new_status": "Rejected",
        "expected_version": 7
    });
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(stale),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Pending);
    assert_eq!(saved.version, 1);

    // With the version the order is actually at, the same transition lands.
    let current = json!({
        "user_id": user_id.to_string(),
        "new_status": "Rejected",
        "expected_version": 1
    });
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(current),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;

    let response = app
        .request(
            Method::PUT,
            "/api/v1/orders/999999/status",
            Some(status_payload(user_id, "Rejected")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_actor_is_not_found() {
    let app = TestApp::new().await;
    let order_number = seed_pending_order(&app).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_number}/status"),
            Some(status_payload(Uuid::new_v4(), "Rejected")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invoiced_probe_reports_the_reference_join() {
    let app = TestApp::new().await;
    let invoiced = seed_pending_order(&app).await;
    let uninvoiced = app
        .seed_order(
            "CUST-02",
            "MAIN",
            "SP-07",
            OrderStatus::Processing,
            dec!(50.00),
            Utc::now(),
        )
        .await;

    app.mount_collection(
        "PostedSalesInvoiceLines",
        json!([common::invoice_line_json(
            "PI-1001",
            "CUST-01",
            &invoiced.to_string(),
            "ITEM-1",
            "2",
            "49.99",
            "99.98"
        )]),
    )
    .await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{invoiced}/invoiced"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["invoiced"], json!(true));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{uninvoiced}/invoiced"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["invoiced"], json!(false));
}

#[tokio::test]
async fn manual_push_returns_the_document_number_without_a_transition() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Admin", None).await;
    let order_number = seed_pending_order(&app).await;

    mount_push_directory(&app).await;
    app.mount_sales_order_post("SO-0077").await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_number}/push"),
            Some(json!({ "user_id": user_id.to_string() })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["erp_document_no"], "SO-0077");

    // The push alone moves nothing.
    let saved = app.order(order_number).await;
    assert_eq!(saved.status, OrderStatus::Pending);
    assert_eq!(saved.version, 1);
}

#[tokio::test]
async fn fetching_an_order_returns_its_lines() {
    let app = TestApp::new().await;
    let order_number = seed_pending_order(&app).await;

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{order_number}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["order_number"], json!(order_number));
    assert_eq!(body["data"]["status"], "Pending");
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["item_no"], "ITEM-1");
}
