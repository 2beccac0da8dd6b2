use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::config::OrderPolicyConfig;
use crate::erp::{Customer, ErpClient, InventoryBalance};
use crate::errors::ServiceError;

use super::orders::OrderLineRequest;

/// Pre-submission gates: customer credit first, inventory second. Both
/// read the ERP directory; the policy flags decide how strict the
/// numeric checks are, while the structural ones (unknown customer,
/// item not stocked at the location) always apply.
#[derive(Clone)]
pub struct ValidationService {
    erp: Arc<ErpClient>,
    policy: OrderPolicyConfig,
}

impl ValidationService {
    pub fn new(erp: Arc<ErpClient>, policy: OrderPolicyConfig) -> Self {
        Self { erp, policy }
    }

    #[instrument(skip(self), fields(customer = %customer_code, order_total = %order_total))]
    pub async fn validate_customer_credit(
        &self,
        customer_code: &str,
        order_total: Decimal,
    ) -> Result<(), ServiceError> {
        let customers = self.erp.get_customers().await?;
        let customer = customers
            .iter()
            .find(|candidate| candidate.no == customer_code)
            .ok_or_else(|| {
                warn!(customer = %customer_code, "Customer not found in ERP directory");
                ServiceError::NotFound(format!("Customer {} not found", customer_code))
            })?;

        check_credit(customer, order_total, self.policy.enforce_credit_limit)?;
        info!(customer = %customer_code, "Customer credit check passed");
        Ok(())
    }

    #[instrument(skip(self, lines), fields(location = %location_code, line_count = lines.len()))]
    pub async fn validate_inventory(
        &self,
        lines: &[OrderLineRequest],
        location_code: &str,
    ) -> Result<(), ServiceError> {
        let balances = self.erp.get_inventory().await?;

        // Lines are checked in request order; the first failure wins.
        for line in lines {
            check_inventory_line(
                &line.item_no,
                location_code,
                line.quantity,
                &balances,
                self.policy.enforce_stock_levels,
            )?;
        }
        info!(location = %location_code, "Inventory check passed");
        Ok(())
    }
}

pub fn check_credit(
    customer: &Customer,
    order_total: Decimal,
    enforce_credit_limit: bool,
) -> Result<(), ServiceError> {
    if !customer.credit_allowed {
        return Err(ServiceError::ValidationError(format!(
            "Customer {} ({}) is not allowed credit purchases",
            customer.no, customer.name
        )));
    }

    if enforce_credit_limit && customer.credit_limit > Decimal::ZERO {
        let exposure = customer.balance + order_total;
        if exposure > customer.credit_limit {
            return Err(ServiceError::ValidationError(format!(
                "Customer {} would exceed its credit limit of {}: balance {} plus order total {} is {}",
                customer.no, customer.credit_limit, customer.balance, order_total, exposure
            )));
        }
    }

    Ok(())
}

pub fn check_inventory_line(
    item_no: &str,
    location_code: &str,
    requested: Decimal,
    balances: &[InventoryBalance],
    enforce_stock_levels: bool,
) -> Result<(), ServiceError> {
    let balance = balances
        .iter()
        .find(|balance| balance.item_no == item_no && balance.location_code == location_code)
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Item {} has no inventory at location {}",
                item_no, location_code
            ))
        })?;

    if enforce_stock_levels && requested > balance.quantity {
        return Err(ServiceError::ValidationError(format!(
            "Insufficient stock for item {} at location {}: requested {}, available {}",
            item_no, location_code, requested, balance.quantity
        )));
    }

    Ok(())
}
