//! Read-only passthroughs over the ERP directory collections, the
//! browse endpoints an order-entry client needs.

use axum::{extract::State, response::Json, routing::get, Router};

use crate::erp::{Customer, InventoryBalance, Item, Location, SalesPerson, SalesPrice};
use crate::{ApiResponse, ApiResult, AppState};

/// Browse ERP customers
#[utoipa::path(
    get,
    path = "/api/v1/directory/customers",
    summary = "List customers",
    responses(
        (status = 200, description = "Customers retrieved", body = ApiResponse<Vec<Customer>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_customers(State(state): State<AppState>) -> ApiResult<Vec<Customer>> {
    let customers = state.services.erp.get_customers().await?;
    Ok(Json(ApiResponse::success(customers)))
}

/// Browse ERP items
#[utoipa::path(
    get,
    path = "/api/v1/directory/items",
    summary = "List items",
    responses(
        (status = 200, description = "Items retrieved", body = ApiResponse<Vec<Item>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_items(State(state): State<AppState>) -> ApiResult<Vec<Item>> {
    let items = state.services.erp.get_items().await?;
    Ok(Json(ApiResponse::success(items)))
}

/// Browse ERP locations
#[utoipa::path(
    get,
    path = "/api/v1/directory/locations",
    summary = "List locations",
    responses(
        (status = 200, description = "Locations retrieved", body = ApiResponse<Vec<Location>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_locations(State(state): State<AppState>) -> ApiResult<Vec<Location>> {
    let locations = state.services.erp.get_locations().await?;
    Ok(Json(ApiResponse::success(locations)))
}

/// Browse ERP salespeople
#[utoipa::path(
    get,
    path = "/api/v1/directory/salespeople",
    summary = "List salespeople",
    responses(
        (status = 200, description = "Salespeople retrieved", body = ApiResponse<Vec<SalesPerson>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_salespeople(State(state): State<AppState>) -> ApiResult<Vec<SalesPerson>> {
    let salespeople = state.services.erp.get_sales_people().await?;
    Ok(Json(ApiResponse::success(salespeople)))
}

/// Browse ERP inventory balances
#[utoipa::path(
    get,
    path = "/api/v1/directory/inventory",
    summary = "List inventory balances",
    responses(
        (status = 200, description = "Inventory balances retrieved", body = ApiResponse<Vec<InventoryBalance>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_inventory(State(state): State<AppState>) -> ApiResult<Vec<InventoryBalance>> {
    let balances = state.services.erp.get_inventory().await?;
    Ok(Json(ApiResponse::success(balances)))
}

/// Browse ERP sales prices
#[utoipa::path(
    get,
    path = "/api/v1/directory/sales-prices",
    summary = "List sales prices",
    responses(
        (status = 200, description = "Sales prices retrieved", body = ApiResponse<Vec<SalesPrice>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 502, description = "ERP directory unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_sales_prices(State(state): State<AppState>) -> ApiResult<Vec<SalesPrice>> {
    let prices = state.services.erp.get_sales_prices().await?;
    Ok(Json(ApiResponse::success(prices)))
}

pub fn directory_routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers))
        .route("/items", get(list_items))
        .route("/locations", get(list_locations))
        .route("/salespeople", get(list_salespeople))
        .route("/inventory", get(list_inventory))
        .route("/sales-prices", get(list_sales_prices))
}
