use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Enum representing the possible statuses of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Rejected")]
    Rejected,
}

impl OrderStatus {
    /// Statuses an order in this status may move to. The lifecycle is a
    /// strict forward walk: Pending -> Processing -> Delivered, with
    /// Rejected reachable from either open status. Terminal statuses
    /// allow nothing.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Rejected],
            OrderStatus::Processing => &[OrderStatus::Delivered, OrderStatus::Rejected],
            OrderStatus::Delivered => &[],
            OrderStatus::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// The open (non-terminal) statuses, in lifecycle order.
    pub fn open_statuses() -> &'static [OrderStatus] {
        &[OrderStatus::Pending, OrderStatus::Processing]
    }
}

/// The `orders` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
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
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(OrderStatus::Pending, OrderStatus::Processing => true)]
    #[test_case(OrderStatus::Pending, OrderStatus::Rejected => true)]
    #[test_case(OrderStatus::Pending, OrderStatus::Delivered => false)]
    #[test_case(OrderStatus::Pending, OrderStatus::Pending => false)]
    #[test_case(OrderStatus::Processing, OrderStatus::Delivered => true)]
    #[test_case(OrderStatus::Processing, OrderStatus::Rejected => true)]
    #[test_case(OrderStatus::Processing, OrderStatus::Pending => false)]
    #[test_case(OrderStatus::Delivered, OrderStatus::Rejected => false)]
    #[test_case(OrderStatus::Delivered, OrderStatus::Processing => false)]
    #[test_case(OrderStatus::Rejected, OrderStatus::Pending => false)]
    #[test_case(OrderStatus::Rejected, OrderStatus::Delivered => false)]
    fn transition(from: OrderStatus, to: OrderStatus) -> bool {
        from.can_transition_to(to)
    }

    #[test]
    fn terminal_statuses_allow_nothing() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
    }

    #[test]
    fn pending_allows_exactly_processing_and_rejected() {
        let allowed = OrderStatus::Pending.allowed_transitions();
        assert_eq!(allowed, &[OrderStatus::Processing, OrderStatus::Rejected]);
    }

    #[test]
    fn status_round_trips_through_display() {
        assert_eq!(OrderStatus::Pending.to_string(), "Pending");
        assert_eq!(OrderStatus::Rejected.to_string(), "Rejected");
    }
}
