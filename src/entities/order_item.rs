use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The `order_items` table. The row id doubles as the sales-line number
/// when the order is pushed to the ERP.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub order_number: i64,
    pub item_no: String,
    pub description: String,
    pub location_code: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub line_amount: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderNumber",
        to = "super::order::Column::OrderNumber",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Line amount after the percentage discount.
pub fn line_amount(quantity: Decimal, unit_price: Decimal, discount_percent: Decimal) -> Decimal {
    quantity * unit_price * (Decimal::ONE - discount_percent / Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_amount_applies_percentage_discount() {
        assert_eq!(line_amount(dec!(2), dec!(10.00), dec!(0)), dec!(20.00));
        assert_eq!(line_amount(dec!(2), dec!(10.00), dec!(25)), dec!(15.0000));
    }

    #[test]
    fn full_discount_zeroes_the_line() {
        assert_eq!(line_amount(dec!(3), dec!(9.99), dec!(100)), dec!(0.0000));
    }
}
