use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::services::orders::{
    ErpPushResult, InvoicedStatus, OrderResponse, SubmitOrderRequest, SubmitOrderResponse,
    UpdateOrderStatusRequest, UpdateOrderStatusResponse,
};
use crate::services::reporting::{EnrichedOrder, OrderStatusSummary};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersQuery {
    /// Acting user; decides whether the view is scoped or global
    pub user_id: Uuid,
    /// Status bucket to list
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SummaryQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PushOrderRequest {
    /// Acting user; must resolve to an active account
    pub user_id: Uuid,
}

/// Submit a new sales order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Submit order",
    description = "Validate a new order against customer credit and inventory, then persist it with status Pending",
    request_body = SubmitOrderRequest,
    responses(
        (status = 201, description = "Order submitted", body = ApiResponse<SubmitOrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Request shape, credit or inventory check failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Acting user or customer not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn submit_order(
    State(state): State<AppState>,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitOrderResponse>>), ServiceError> {
    if let Err(validation_errors) = request.validate() {
        let errors: Vec<String> = validation_errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                let field = field.clone();
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error.message.as_ref().unwrap_or(&"Invalid value".into())
                    )
                })
            })
            .collect();
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::validation_errors(errors)),
        ));
    }

    let response = state.services.orders.submit_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// List orders in one status for the acting user
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Orders in one status, scoped to the caller's salesperson code unless they can view all orders, enriched with directory names",
    params(
        ("user_id" = Uuid, Query, description = "Acting user id"),
        ("status" = OrderStatus, Query, description = "Status bucket to list"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<EnrichedOrder>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid query parameters", body = crate::errors::ErrorResponse),
        (status = 404, description = "Acting user not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<Vec<EnrichedOrder>> {
    let orders = state
        .services
        .reporting
        .list_orders(query.user_id, query.status)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Get a single order with its lines
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_number}",
    summary = "Get order",
    params(
        ("order_number" = i64, Path, description = "Local order number"),
    ),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<i64>,
) -> ApiResult<OrderResponse> {
    let order = state.services.orders.get_order(order_number).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Apply a status transition to an order
#[utoipa::path(
    put,
    path = "/api/v1/orders/{order_number}/status",
    summary = "Update order status",
    description = "Apply a transition from the order status graph. Moving to Processing pushes the order to the ERP first; moving to Delivered requires a posted invoice referencing the order",
    params(
        ("order_number" = i64, Path, description = "Local order number"),
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<UpdateOrderStatusResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Transition not allowed from the current status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or acting user not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent update conflict", body = crate::errors::ErrorResponse),
        (status = 422, description = "Order is not invoiced yet", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP push or invoice fetch failed", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_number): Path<i64>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<UpdateOrderStatusResponse> {
    let response = state
        .services
        .orders
        .update_order_status(order_number, request)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Check whether an order has been invoiced in the ERP
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_number}/invoiced",
    summary = "Check invoiced",
    description = "Reports whether any posted invoice line in the ERP references the order",
    params(
        ("order_number" = i64, Path, description = "Local order number"),
    ),
    responses(
        (status = 200, description = "Invoiced flag computed", body = ApiResponse<InvoicedStatus>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Invoice fetch failed", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn check_order_invoiced(
    State(state): State<AppState>,
    Path(order_number): Path<i64>,
) -> ApiResult<InvoicedStatus> {
    let status = state.services.orders.check_invoiced(order_number).await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Push an order to the ERP without changing its status
#[utoipa::path(
    post,
    path = "/api/v1/orders/{order_number}/push",
    summary = "Push order to ERP",
    description = "Builds the sales-order payload and posts it to the ERP. The Processing transition runs the same push; this endpoint exists for manual re-pushes",
    params(
        ("order_number" = i64, Path, description = "Local order number"),
    ),
    request_body = PushOrderRequest,
    responses(
        (status = 200, description = "Order pushed", body = ApiResponse<ErpPushResult>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "Order, acting user, customer or location not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP push failed", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn push_order_to_erp(
    State(state): State<AppState>,
    Path(order_number): Path<i64>,
    Json(request): Json<PushOrderRequest>,
) -> ApiResult<ErpPushResult> {
    let result = state
        .services
        .orders
        .post_order_to_erp(order_number, request.user_id)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Count orders per status for the acting user
#[utoipa::path(
    get,
    path = "/api/v1/orders/summary",
    summary = "Order status summary",
    params(
        ("user_id" = Uuid, Query, description = "Acting user id"),
    ),
    responses(
        (status = 200, description = "Counts computed", body = ApiResponse<OrderStatusSummary>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "Acting user not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn order_status_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<OrderStatusSummary> {
    let summary = state.services.reporting.status_summary(query.user_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(submit_order).get(list_orders))
        .route("/orders/summary", get(order_status_summary))
        .route("/orders/:order_number", get(get_order))
        .route("/orders/:order_number/status", put(update_order_status))
        .route("/orders/:order_number/invoiced", get(check_order_invoiced))
        .route("/orders/:order_number/push", post(push_order_to_erp))
}
