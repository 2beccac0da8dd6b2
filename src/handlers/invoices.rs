use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::reporting::{CustomerInvoice, CustomerInvoiceSummary};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct InvoiceQuery {
    /// Acting user; decides whether the view is scoped or global
    pub user_id: Uuid,
}

/// Invoice totals per customer
#[utoipa::path(
    get,
    path = "/api/v1/invoices/customers",
    summary = "Customer invoice summary",
    description = "Posted-invoice count and total per customer, scoped to the caller's salesperson code unless they can view all orders. Customers without posted invoices are omitted",
    params(
        ("user_id" = Uuid, Query, description = "Acting user id"),
    ),
    responses(
        (status = 200, description = "Summaries computed", body = ApiResponse<Vec<CustomerInvoiceSummary>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "Acting user not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_customer_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoiceQuery>,
) -> ApiResult<Vec<CustomerInvoiceSummary>> {
    let summaries = state
        .services
        .reporting
        .customer_invoices(query.user_id)
        .await?;
    Ok(Json(ApiResponse::success(summaries)))
}

/// Per-invoice breakdown for one customer
#[utoipa::path(
    get,
    path = "/api/v1/invoices/customers/{customer_code}",
    summary = "Customer invoice details",
    description = "Posted invoices for one customer with their lines, each resolved to the local order it references where the reference parses",
    params(
        ("customer_code" = String, Path, description = "ERP customer number"),
        ("user_id" = Uuid, Query, description = "Acting user id"),
    ),
    responses(
        (status = 200, description = "Invoices retrieved", body = ApiResponse<Vec<CustomerInvoice>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "Customer not found or outside the caller's scope", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_customer_invoices(
    State(state): State<AppState>,
    Path(customer_code): Path<String>,
    Query(query): Query<InvoiceQuery>,
) -> ApiResult<Vec<CustomerInvoice>> {
    let invoices = state
        .services
        .reporting
        .customer_invoice_details(query.user_id, &customer_code)
        .await?;
    Ok(Json(ApiResponse::success(invoices)))
}

pub fn invoices_routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customer_invoices))
        .route("/customers/:customer_code", get(get_customer_invoices))
}
