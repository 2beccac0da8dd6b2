use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, NotSet, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order::{
    self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderStatus,
};
use crate::entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel};
use crate::erp::{ErpClient, SalesOrderLine, SalesOrderPayload};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::reconciliation;
use crate::services::users::UserDirectoryService;
use crate::services::validation::ValidationService;

/// Request/Response types for the order service

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitOrderRequest {
    /// Acting user; the seam where a session layer would slot in.
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "Customer code is required"))]
    pub customer_code: String,
    #[validate(length(min = 1, message = "Location code is required"))]
    pub location_code: String,
    pub requested_delivery_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderLineRequest {
    pub item_no: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitOrderResponse {
    pub order_number: i64,
    pub status: OrderStatus,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// Acting user; must resolve to an active account.
    pub user_id: Uuid,
    pub new_status: OrderStatus,
    /// Version the caller last saw; a mismatch is a conflict.
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusResponse {
    pub order_number: i64,
    pub status: OrderStatus,
    pub version: i32,
    pub erp_document_no: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: i64,
    pub item_no: String,
    pub description: String,
    pub location_code: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub line_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub order_number: i64,
    pub customer_code: String,
    pub location_code: String,
    pub salesperson_code: String,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub requested_delivery_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub total_amount: Decimal,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoicedStatus {
    pub order_number: i64,
    pub invoiced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErpPushResult {
    pub order_number: i64,
    pub erp_document_no: String,
}

/// Order lifecycle engine: submission, status transitions with their
/// guards, invoice reconciliation and the ERP push.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    erp: Arc<ErpClient>,
    users: UserDirectoryService,
    validation: ValidationService,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        erp: Arc<ErpClient>,
        users: UserDirectoryService,
        validation: ValidationService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            erp,
            users,
            validation,
            event_sender,
        }
    }

    /// Submits a new order. Shape checks, user resolution, credit and
    /// inventory gates all run before anything is written; the order and
    /// its lines are persisted in one transaction with status `Pending`.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, customer = %request.customer_code))]
    pub async fn submit_order(
        &self,
        request: SubmitOrderRequest,
    ) -> Result<SubmitOrderResponse, ServiceError> {
        // Validate the request shape
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_lines(&request.lines)?;

        // Resolve the acting user and their salesperson stamp
        let user = self.users.get_user(request.user_id).await?;
        let salesperson_code = user.salesperson_code.clone().ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "User {} has no salesperson code and cannot submit orders",
                user.email
            ))
        })?;
        let allowed_locations = self.users.location_codes(user.id).await?;
        if !allowed_locations.is_empty() && !allowed_locations.contains(&request.location_code) {
            return Err(ServiceError::ValidationError(format!(
                "User {} may not order from location {}",
                user.email, request.location_code
            )));
        }

        // Compute line amounts and the order total
        let line_amounts: Vec<Decimal> = request
            .lines
            .iter()
            .map(|line| {
                order_item::line_amount(line.quantity, line.unit_price, line.discount_percent)
            })
            .collect();
        let total_amount: Decimal = line_amounts.iter().copied().sum();

        // Credit strictly before inventory
        self.validation
            .validate_customer_credit(&request.customer_code, total_amount)
            .await?;
        self.validation
            .validate_inventory(&request.lines, &request.location_code)
            .await?;

        // Persist order and lines atomically
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order submission");
            ServiceError::DatabaseError(e)
        })?;

        let order_model = OrderActiveModel {
            order_number: NotSet,
            customer_code: Set(request.customer_code.clone()),
            location_code: Set(request.location_code.clone()),
            salesperson_code: Set(salesperson_code),
            status: Set(OrderStatus::Pending),
            order_date: Set(now),
            requested_delivery_date: Set(request.requested_delivery_date),
            note: Set(request.note.clone()),
            total_amount: Set(total_amount),
            version: Set(1),
            created_by: Set(user.id),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let item_models: Vec<order_item::ActiveModel> = request
            .lines
            .iter()
            .zip(line_amounts.iter())
            .map(|(line, amount)| order_item::ActiveModel {
                id: NotSet,
                order_number: Set(order_model.order_number),
                item_no: Set(line.item_no.clone()),
                description: Set(line.description.clone().unwrap_or_default()),
                location_code: Set(request.location_code.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                discount_percent: Set(line.discount_percent),
                line_amount: Set(*amount),
            })
            .collect();

        OrderItemEntity::insert_many(item_models)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_number = order_model.order_number, "Failed to insert order items");
                ServiceError::DatabaseError(e)
            })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit order submission");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_number = order_model.order_number,
            total = %total_amount,
            "Order submitted"
        );

        if let Some(event_sender) = &self.event_sender {
            let event = Event::order_submitted(
                order_model.order_number,
                &order_model.customer_code,
                total_amount,
            );
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, order_number = order_model.order_number, "Failed to send order submitted event");
            }
        }

        Ok(SubmitOrderResponse {
            order_number: order_model.order_number,
            status: order_model.status,
            total_amount,
        })
    }

    /// Retrieves an order with its lines.
    #[instrument(skip(self), fields(order_number = order_number))]
    pub async fn get_order(&self, order_number: i64) -> Result<OrderResponse, ServiceError> {
        let order = self.load_order(order_number).await?;
        let items = self.load_items(order_number).await?;
        Ok(order_to_response(order, items))
    }

    /// Applies a status transition with its guards. `Processing` pushes
    /// the order to the ERP first and only commits locally once the push
    /// succeeded; `Delivered` requires the ERP to show a posted invoice;
    /// the commit itself is conditional on the version the order was
    /// loaded at.
    #[instrument(skip(self, request), fields(order_number = order_number, new_status = %request.new_status, user_id = %request.user_id))]
    pub async fn update_order_status(
        &self,
        order_number: i64,
        request: UpdateOrderStatusRequest,
    ) -> Result<UpdateOrderStatusResponse, ServiceError> {
        let _actor = self.users.get_user(request.user_id).await?;
        let order = self.load_order(order_number).await?;
        let current = order.status;
        let new_status = request.new_status;

        // Re-applying a terminal status is a no-op
        if current.is_terminal() && current == new_status {
            info!(order_number, status = %current, "Status already applied");
            return Ok(UpdateOrderStatusResponse {
                order_number,
                status: current,
                version: order.version,
                erp_document_no: None,
            });
        }

        ensure_transition(order_number, current, new_status)?;

        if let Some(expected) = request.expected_version {
            if expected != order.version {
                return Err(ServiceError::Conflict(format!(
                    "Order {} was updated concurrently: expected version {}, found {}",
                    order_number, expected, order.version
                )));
            }
        }

        // Target-specific guards
        let mut erp_document_no = None;
        match new_status {
            OrderStatus::Processing => {
                let document_no = self.push_to_erp(&order).await?;
                erp_document_no = Some(document_no);
            }
            OrderStatus::Delivered => {
                let lines = self.erp.get_posted_invoice_lines().await?;
                if !reconciliation::is_order_invoiced(order_number, &lines) {
                    return Err(ServiceError::InconsistentState(format!(
                        "Order {} is not invoiced and cannot be marked Delivered",
                        order_number
                    )));
                }
            }
            _ => {}
        }

        // Conditional commit on the loaded version
        let db = &*self.db_pool;
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::Version, Expr::value(order.version + 1))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::OrderNumber.eq(order_number))
            .filter(order::Column::Version.eq(order.version))
            .exec(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_number, "Failed to update order status");
                ServiceError::DatabaseError(e)
            })?;

        if result.rows_affected == 0 {
            if erp_document_no.is_some() {
                warn!(
                    order_number,
                    "ERP push succeeded but the local commit lost a version race"
                );
            }
            return Err(ServiceError::Conflict(format!(
                "Order {} was updated concurrently",
                order_number
            )));
        }

        info!(order_number, from = %current, to = %new_status, "Order status updated");

        if let Some(event_sender) = &self.event_sender {
            let event = Event::order_status_changed(order_number, current, new_status);
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, order_number, "Failed to send status changed event");
            }
        }

        Ok(UpdateOrderStatusResponse {
            order_number,
            status: new_status,
            version: order.version + 1,
            erp_document_no,
        })
    }

    /// Reports whether the ERP shows a posted invoice referencing the
    /// order. A directory fetch failure propagates; it is never folded
    /// into `false`.
    #[instrument(skip(self), fields(order_number = order_number))]
    pub async fn check_invoiced(&self, order_number: i64) -> Result<InvoicedStatus, ServiceError> {
        let _ = self.load_order(order_number).await?;
        let lines = self.erp.get_posted_invoice_lines().await?;
        Ok(InvoicedStatus {
            order_number,
            invoiced: reconciliation::is_order_invoiced(order_number, &lines),
        })
    }

    /// Pushes an order to the ERP on demand. The `Processing` transition
    /// calls the same path; this entry point exists for manual re-pushes.
    #[instrument(skip(self), fields(order_number = order_number, user_id = %user_id))]
    pub async fn post_order_to_erp(
        &self,
        order_number: i64,
        user_id: Uuid,
    ) -> Result<ErpPushResult, ServiceError> {
        let _actor = self.users.get_user(user_id).await?;
        let order = self.load_order(order_number).await?;
        let erp_document_no = self.push_to_erp(&order).await?;
        Ok(ErpPushResult {
            order_number,
            erp_document_no,
        })
    }

    async fn push_to_erp(&self, order: &OrderModel) -> Result<String, ServiceError> {
        let items = self.load_items(order.order_number).await?;
        let payload = self.build_payload(order, &items).await?;
        let document_no = self.erp.post_sales_order(&payload).await?;

        info!(
            order_number = order.order_number,
            erp_document = %document_no,
            "Order pushed to ERP"
        );

        if let Some(event_sender) = &self.event_sender {
            let event = Event::order_posted_to_erp(order.order_number, &document_no);
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, order_number = order.order_number, "Failed to send ERP push event");
            }
        }

        Ok(document_no)
    }

    async fn build_payload(
        &self,
        order: &OrderModel,
        items: &[OrderItemModel],
    ) -> Result<SalesOrderPayload, ServiceError> {
        let customers = self.erp.get_customers().await?;
        let customer = customers
            .iter()
            .find(|candidate| candidate.no == order.customer_code)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", order.customer_code))
            })?;

        // The location must still exist upstream or the posted order would
        // reference a code the ERP rejects.
        let locations = self.erp.get_locations().await?;
        if !locations
            .iter()
            .any(|candidate| candidate.code == order.location_code)
        {
            return Err(ServiceError::NotFound(format!(
                "Location {} not found",
                order.location_code
            )));
        }

        Ok(SalesOrderPayload {
            customer_no: order.customer_code.clone(),
            location_code: order.location_code.clone(),
            order_date: order.order_date.date_naive(),
            external_document_number: order.order_number.to_string(),
            payment_terms_code: customer.payment_terms_code.clone(),
            payment_method_code: customer.payment_method_code.clone(),
            lines: items
                .iter()
                .map(|item| SalesOrderLine {
                    line_no: item.id,
                    item_no: item.item_no.clone(),
                    location_code: item.location_code.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    discount_percent: item.discount_percent,
                })
                .collect(),
        })
    }

    async fn load_order(&self, order_number: i64) -> Result<OrderModel, ServiceError> {
        let db = &*self.db_pool;
        OrderEntity::find_by_id(order_number)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_number, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))
    }

    async fn load_items(&self, order_number: i64) -> Result<Vec<OrderItemModel>, ServiceError> {
        let db = &*self.db_pool;
        OrderItemEntity::find()
            .filter(order_item::Column::OrderNumber.eq(order_number))
            .order_by_asc(order_item::Column::Id)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_number, "Failed to fetch order items");
                ServiceError::DatabaseError(e)
            })
    }
}

fn validate_lines(lines: &[OrderLineRequest]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "Order must contain at least one line".to_string(),
        ));
    }
    for line in lines {
        if line.item_no.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Order lines must carry an item number".to_string(),
            ));
        }
        if line.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for item {} must be positive",
                line.item_no
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Unit price for item {} cannot be negative",
                line.item_no
            )));
        }
        if line.discount_percent < Decimal::ZERO || line.discount_percent > Decimal::ONE_HUNDRED {
            return Err(ServiceError::ValidationError(format!(
                "Discount for item {} must be between 0 and 100",
                line.item_no
            )));
        }
    }
    Ok(())
}

fn ensure_transition(
    order_number: i64,
    current: OrderStatus,
    new_status: OrderStatus,
) -> Result<(), ServiceError> {
    if current.can_transition_to(new_status) {
        return Ok(());
    }

    let allowed = current.allowed_transitions();
    let message = if allowed.is_empty() {
        format!(
            "Order {} is {}, a terminal status; no further transitions are allowed",
            order_number, current
        )
    } else {
        let allowed = allowed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Order {} cannot move from {} to {}; allowed transitions: {}",
            order_number, current, new_status, allowed
        )
    };
    Err(ServiceError::ValidationError(message))
}

fn order_to_response(order: OrderModel, items: Vec<OrderItemModel>) -> OrderResponse {
    OrderResponse {
        order_number: order.order_number,
        customer_code: order.customer_code,
        location_code: order.location_code,
        salesperson_code: order.salesperson_code,
        status: order.status,
        order_date: order.order_date,
        requested_delivery_date: order.requested_delivery_date,
        note: order.note,
        total_amount: order.total_amount,
        version: order.version,
        created_at: order.created_at,
        updated_at: order.updated_at,
        items: items.into_iter().map(item_to_response).collect(),
    }
}

fn item_to_response(item: OrderItemModel) -> OrderItemResponse {
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
