use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SalesDesk API",
        version = "0.2.0",
        description = r#"
# SalesDesk Order Management API

Backend for field sales order entry: order lifecycle against a local store,
validation and enrichment against an external Business-Central-style ERP, and
reconciliation of delivered orders against posted invoices.

## Acting user

Authentication flows are handled outside this service. Every operation that
acts on behalf of a user takes an explicit `user_id`: a body field on writes,
a query parameter on reads. The user must exist and be active.

## Error handling

Errors come back as a structured body with `error`, `message`, `request_id`
and `timestamp`. Validation and state errors carry actionable messages;
upstream ERP failures are reported as 502 without leaking upstream detail.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Order submission, lifecycle and reconciliation"),
        (name = "invoices", description = "Posted-invoice aggregation per customer"),
        (name = "directory", description = "Read-only ERP directory browsing")
    ),
    paths(
        // Orders
        crate::handlers::orders::submit_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::order_status_summary,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::check_order_invoiced,
        crate::handlers::orders::push_order_to_erp,

        // Invoices
        crate::handlers::invoices::list_customer_invoices,
        crate::handlers::invoices::get_customer_invoices,

        // Directory
        crate::handlers::directory::list_customers,
        crate::handlers::directory::list_items,
        crate::handlers::directory::list_locations,
        crate::handlers::directory::list_salespeople,
        crate::handlers::directory::list_inventory,
        crate::handlers::directory::list_sales_prices,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::errors::ErrorResponse,

            // Order types
            crate::entities::order::OrderStatus,
            crate::services::orders::SubmitOrderRequest,
            crate::services::orders::OrderLineRequest,
            crate::services::orders::SubmitOrderResponse,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::UpdateOrderStatusResponse,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::InvoicedStatus,
            crate::services::orders::ErpPushResult,
            crate::handlers::orders::PushOrderRequest,

            // Reporting types
            crate::services::reporting::EnrichedOrder,
            crate::services::reporting::InvoicedItemView,
            crate::services::reporting::OrderStatusSummary,
            crate::services::reporting::CustomerInvoiceSummary,
            crate::services::reporting::CustomerInvoice,

            // Directory types
            crate::erp::Customer,
            crate::erp::Item,
            crate::erp::Location,
            crate::erp::SalesPerson,
            crate::erp::InventoryBalance,
            crate::erp::SalesPrice,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_the_core_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("SalesDesk API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/orders/{order_number}/status"));
        assert!(json.contains("/api/v1/invoices/customers"));
        assert!(json.contains("/api/v1/directory/inventory"));
    }
}
