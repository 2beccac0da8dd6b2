use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::OrderPolicyConfig;
use crate::db::DbPool;
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel};
use crate::erp::{ErpClient, PostedInvoiceLine};
use crate::errors::ServiceError;
use crate::services::reconciliation::{self, parse_order_reference};
use crate::services::users::UserDirectoryService;

use super::orders::OrderItemResponse;

/// An order joined with directory display names and, for delivered
/// views, the posted invoice lines that reference it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrichedOrder {
    pub order_number: i64,
    pub customer_code: String,
    pub customer_name: Option<String>,
    pub location_code: String,
    pub location_name: Option<String>,
    pub salesperson_code: String,
    pub salesperson_name: Option<String>,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub requested_delivery_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub total_amount: Decimal,
    pub version: i32,
    pub items: Vec<OrderItemResponse>,
    pub invoice_doc_no: Option<String>,
    pub invoiced_items: Option<Vec<InvoicedItemView>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoicedItemView {
    pub item_no: String,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OrderStatusSummary {
    pub pending: u64,
    pub processing: u64,
    pub delivered: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerInvoiceSummary {
    pub customer_code: String,
    pub customer_name: String,
    pub invoice_count: u64,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerInvoice {
    pub document_no: String,
    pub posting_date: NaiveDate,
    /// Local order the invoice references, when the weak join succeeds.
    pub order_number: Option<i64>,
    /// The referenced order's date; falls back to today when the
    /// reference does not resolve.
    pub order_date: NaiveDate,
    pub total_amount: Decimal,
    pub lines: Vec<InvoicedItemView>,
}

/// Read-side aggregation: enriched order views, status counts and
/// per-customer invoice rollups. Directory fetches are gathered in
/// parallel; one failed fetch fails the whole view.
#[derive(Clone)]
pub struct ReportingService {
    db_pool: Arc<DbPool>,
    erp: Arc<ErpClient>,
    users: UserDirectoryService,
    policy: OrderPolicyConfig,
}

impl ReportingService {
    pub fn new(
        db_pool: Arc<DbPool>,
        erp: Arc<ErpClient>,
        users: UserDirectoryService,
        policy: OrderPolicyConfig,
    ) -> Self {
        Self {
            db_pool,
            erp,
            users,
            policy,
        }
    }

    /// Lists orders in one status, enriched with directory names and,
    /// for `Delivered`, the invoice weak join.
    #[instrument(skip(self), fields(user_id = %user_id, status = %status))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        status: OrderStatus,
    ) -> Result<Vec<EnrichedOrder>, ServiceError> {
        let scope = self.salesperson_scope(user_id).await?;
        let statuses = statuses_for_view(
            status,
            scope.is_none(),
            self.policy.admin_merges_open_statuses,
        );

        let db = &*self.db_pool;
        let mut query = OrderEntity::find().filter(order::Column::Status.is_in(statuses));
        if let Some(code) = &scope {
            query = query.filter(order::Column::SalespersonCode.eq(code.clone()));
        }
        let orders = query
            .order_by_asc(order::Column::OrderNumber)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list orders");
                ServiceError::DatabaseError(e)
            })?;

        // Invoice lines are only needed for the delivered view
        let want_invoices = status == OrderStatus::Delivered;
        let (customers, salespeople, locations, invoice_lines) = if want_invoices {
            tokio::try_join!(
                self.erp.get_customers(),
                self.erp.get_sales_people(),
                self.erp.get_locations(),
                self.erp.get_posted_invoice_lines(),
            )?
        } else {
            let (customers, salespeople, locations) = tokio::try_join!(
                self.erp.get_customers(),
                self.erp.get_sales_people(),
                self.erp.get_locations(),
            )?;
            (customers, salespeople, locations, Vec::new())
        };

        let mut items_by_order = self
            .items_grouped_by_order(orders.iter().map(|order| order.order_number).collect())
            .await?;

        let customer_names: HashMap<String, String> = customers
            .into_iter()
            .map(|customer| (customer.no, customer.name))
            .collect();
        let salesperson_names: HashMap<String, String> = salespeople
            .into_iter()
            .map(|person| (person.code, person.name))
            .collect();
        let location_names: HashMap<String, String> = locations
            .into_iter()
            .map(|location| (location.code, location.name))
            .collect();
        let mut invoices_by_order = reconciliation::group_lines_by_order(&invoice_lines);

        let mut enriched = Vec::with_capacity(orders.len());
        for order in orders {
            let items = items_by_order.remove(&order.order_number).unwrap_or_default();
            let matched = invoices_by_order.remove(&order.order_number);
            let invoice_doc_no = matched
                .as_ref()
                .and_then(|lines| lines.first().map(|line| line.document_no.clone()));
            let invoiced_items = matched
                .map(|lines| lines.into_iter().map(invoiced_item_view).collect());

            enriched.push(EnrichedOrder {
                order_number: order.order_number,
                customer_name: customer_names.get(&order.customer_code).cloned(),
                customer_code: order.customer_code,
                location_name: location_names.get(&order.location_code).cloned(),
                location_code: order.location_code,
                salesperson_name: salesperson_names.get(&order.salesperson_code).cloned(),
                salesperson_code: order.salesperson_code,
                status: order.status,
                order_date: order.order_date,
                requested_delivery_date: order.requested_delivery_date,
                note: order.note,
                total_amount: order.total_amount,
                version: order.version,
                items: items.into_iter().map(item_view).collect(),
                invoice_doc_no,
                invoiced_items,
            });
        }

        info!(count = enriched.len(), "Orders listed");
        Ok(enriched)
    }

    /// Counts of orders per status, scoped like `list_orders`.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn status_summary(&self, user_id: Uuid) -> Result<OrderStatusSummary, ServiceError> {
        let scope = self.salesperson_scope(user_id).await?;
        let db = &*self.db_pool;

        let mut summary = OrderStatusSummary::default();
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Delivered,
            OrderStatus::Rejected,
        ] {
            let mut query = OrderEntity::find().filter(order::Column::Status.eq(status));
            if let Some(code) = &scope {
                query = query.filter(order::Column::SalespersonCode.eq(code.clone()));
            }
            let count = query.count(db).await.map_err(|e| {
                error!(error = %e, status = %status, "Failed to count orders");
                ServiceError::DatabaseError(e)
            })?;
            match status {
                OrderStatus::Pending => summary.pending = count,
                OrderStatus::Processing => summary.processing = count,
                OrderStatus::Delivered => summary.delivered = count,
                OrderStatus::Rejected => summary.rejected = count,
            }
        }
        Ok(summary)
    }

    /// Per-customer invoice rollup. Non-admin users only see customers
    /// owned by their salesperson code; customers without any posted
    /// invoice are omitted.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn customer_invoices(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CustomerInvoiceSummary>, ServiceError> {
        let scope = self.salesperson_scope(user_id).await?;
        let (customers, lines) = tokio::try_join!(
            self.erp.get_customers(),
            self.erp.get_posted_invoice_lines(),
        )?;

        let mut lines_by_customer: HashMap<&str, Vec<&PostedInvoiceLine>> = HashMap::new();
        for line in &lines {
            lines_by_customer
                .entry(line.sell_to_customer_no.as_str())
                .or_default()
                .push(line);
        }

        let mut summaries = Vec::new();
        for customer in &customers {
            if let Some(code) = &scope {
                if &customer.salesperson_code != code {
                    continue;
                }
            }
            let customer_lines = match lines_by_customer.get(customer.no.as_str()) {
                Some(customer_lines) => customer_lines,
                None => continue,
            };
            let invoice_count = customer_lines
                .iter()
                .map(|line| line.document_no.as_str())
                .collect::<HashSet<_>>()
                .len() as u64;
            let total_amount = customer_lines.iter().map(|line| line.line_amount).sum();

            summaries.push(CustomerInvoiceSummary {
                customer_code: customer.no.clone(),
                customer_name: customer.name.clone(),
                invoice_count,
                total_amount,
            });
        }
        summaries.sort_by(|a, b| a.customer_code.cmp(&b.customer_code));
        Ok(summaries)
    }

    /// Per-invoice breakdown for one customer, lines grouped by
    /// document number. Each invoice resolves its local order through
    /// the weak join; an unresolvable reference falls back to today's
    /// date for the order date.
    #[instrument(skip(self), fields(user_id = %user_id, customer = %customer_code))]
    pub async fn customer_invoice_details(
        &self,
        user_id: Uuid,
        customer_code: &str,
    ) -> Result<Vec<CustomerInvoice>, ServiceError> {
        let scope = self.salesperson_scope(user_id).await?;
        let (customers, lines) = tokio::try_join!(
            self.erp.get_customers(),
            self.erp.get_posted_invoice_lines(),
        )?;

        let customer = customers
            .iter()
            .find(|candidate| candidate.no == customer_code)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", customer_code))
            })?;
        if let Some(code) = &scope {
            // Out-of-scope customers are indistinguishable from missing ones
            if &customer.salesperson_code != code {
                return Err(ServiceError::NotFound(format!(
                    "Customer {} not found",
                    customer_code
                )));
            }
        }

        let mut by_document: BTreeMap<String, Vec<&PostedInvoiceLine>> = BTreeMap::new();
        for line in lines
            .iter()
            .filter(|line| line.sell_to_customer_no == customer_code)
        {
            by_document
                .entry(line.document_no.clone())
                .or_default()
                .push(line);
        }

        let mut wanted_orders: HashSet<i64> = HashSet::new();
        for doc_lines in by_document.values() {
            for line in doc_lines {
                if let Ok(order_number) = parse_order_reference(&line.order_no) {
                    wanted_orders.insert(order_number);
                }
            }
        }
        let order_dates = self.order_dates(wanted_orders).await?;

        let today = Utc::now().date_naive();
        let mut invoices = Vec::new();
        for (document_no, doc_lines) in by_document {
            let order_number = doc_lines
                .iter()
                .find_map(|line| parse_order_reference(&line.order_no).ok());
            let order_date = order_number
                .and_then(|number| order_dates.get(&number).copied())
                .unwrap_or(today);
            let posting_date = doc_lines
                .first()
                .map(|line| line.posting_date)
                .unwrap_or(today);
            let total_amount = doc_lines.iter().map(|line| line.line_amount).sum();

            invoices.push(CustomerInvoice {
                document_no,
                posting_date,
                order_number,
                order_date,
                total_amount,
                lines: doc_lines
                    .into_iter()
                    .map(|line| invoiced_item_view(line.clone()))
                    .collect(),
            });
        }
        Ok(invoices)
    }

    /// `None` means the user sees everything; `Some(code)` restricts to
    /// orders and customers stamped with that salesperson code.
    async fn salesperson_scope(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        let user = self.users.get_user(user_id).await?;
        let role = self.users.role(&user)?;
        if role.can_view_all_orders() {
            return Ok(None);
        }
        user.salesperson_code.clone().map(Some).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "User {} has no salesperson code",
                user.email
            ))
        })
    }

    async fn items_grouped_by_order(
        &self,
        order_numbers: Vec<i64>,
    ) -> Result<HashMap<i64, Vec<OrderItemModel>>, ServiceError> {
        let mut grouped: HashMap<i64, Vec<OrderItemModel>> = HashMap::new();
        if order_numbers.is_empty() {
            return Ok(grouped);
        }

        let db = &*self.db_pool;
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderNumber.is_in(order_numbers))
            .order_by_asc(order_item::Column::Id)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order items");
                ServiceError::DatabaseError(e)
            })?;

        for item in items {
            grouped.entry(item.order_number).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn order_dates(
        &self,
        order_numbers: HashSet<i64>,
    ) -> Result<HashMap<i64, NaiveDate>, ServiceError> {
        let mut dates = HashMap::new();
        if order_numbers.is_empty() {
            return Ok(dates);
        }

        let db = &*self.db_pool;
        let orders = OrderEntity::find()
            .filter(order::Column::OrderNumber.is_in(order_numbers.into_iter().collect::<Vec<_>>()))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch referenced orders");
                ServiceError::DatabaseError(e)
            })?;

        for order in orders {
            dates.insert(order.order_number, order.order_date.date_naive());
        }
        Ok(dates)
    }
}

/// The statuses a view actually queries. An all-orders viewer asking for
/// `Pending` sees `Processing` merged in when the policy flag is on.
fn statuses_for_view(requested: OrderStatus, sees_all: bool, merge_open: bool) -> Vec<OrderStatus> {
    if merge_open && sees_all && requested == OrderStatus::Pending {
        return vec![OrderStatus::Pending, OrderStatus::Processing];
    }
    vec![requested]
}

fn item_view(item: OrderItemModel) -> OrderItemResponse {
    OrderItemResponse {
        id: item.id,
        item_no: item.item_no,
        description: item.description,
        location_code: item.location_code,
        quantity: item.quantity,
        unit_price: item.unit_price,
        discount_percent: item.discount_percent,
        line_amount: item.line_amount,
    }
}

fn invoiced_item_view(line: PostedInvoiceLine) -> InvoicedItemView {
    InvoicedItemView {
        item_no: line.item_no,
        description: line.description,
        quantity: line.quantity,
        unit_price: line.unit_price,
        line_amount: line.line_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_view_merges_processing_only_for_all_order_viewers_with_the_flag() {
        assert_eq!(
            statuses_for_view(OrderStatus::Pending, true, true),
            vec![OrderStatus::Pending, OrderStatus::Processing]
        );
        assert_eq!(
            statuses_for_view(OrderStatus::Pending, false, true),
            vec![OrderStatus::Pending]
        );
        assert_eq!(
            statuses_for_view(OrderStatus::Pending, true, false),
            vec![OrderStatus::Pending]
        );
    }

    #[test]
    fn non_pending_views_are_never_merged() {
        assert_eq!(
            statuses_for_view(OrderStatus::Delivered, true, true),
            vec![OrderStatus::Delivered]
        );
        assert_eq!(
            statuses_for_view(OrderStatus::Processing, true, true),
            vec![OrderStatus::Processing]
        );
    }
}
