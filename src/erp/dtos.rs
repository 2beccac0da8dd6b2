use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// OData-style collection envelope: every directory fetch comes back as
/// `{"value": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ODataCollection<T> {
    pub value: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub no: String,
    pub name: String,
    #[serde(default)]
    pub credit_allowed: bool,
    #[serde(default)]
    pub credit_limit: Decimal,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub payment_terms_code: String,
    #[serde(default)]
    pub payment_method_code: String,
    #[serde(default)]
    pub salesperson_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesPerson {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub no: String,
    pub description: String,
    #[serde(default)]
    pub base_unit_of_measure: String,
    #[serde(default)]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryBalance {
    pub item_no: String,
    pub location_code: String,
    #[serde(default)]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesPrice {
    pub item_no: String,
    pub sales_code: String,
    #[serde(default)]
    pub unit_price: Decimal,
    pub starting_date: NaiveDate,
}

/// A line of a posted sales invoice. `order_no` is the weak-join key back
/// to a local order: a free-text echo of the external document number the
/// order was pushed with, so it may be empty or non-numeric.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostedInvoiceLine {
    pub document_no: String,
    pub sell_to_customer_no: String,
    #[serde(default)]
    pub order_no: String,
    pub posting_date: NaiveDate,
    pub item_no: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub line_amount: Decimal,
}

/// Sales order header pushed to the ERP. `external_document_number`
/// carries the local order number; posted invoice lines echo it back in
/// `order_no`, which is what makes the reconciliation join possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderPayload {
    pub customer_no: String,
    pub location_code: String,
    pub order_date: NaiveDate,
    pub external_document_number: String,
    pub payment_terms_code: String,
    pub payment_method_code: String,
    pub lines: Vec<SalesOrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderLine {
    pub line_no: i64,
    pub item_no: String,
    pub location_code: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
}

/// Shape of the ERP's reply to a sales-order POST.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderCreated {
    pub no: String,
}
