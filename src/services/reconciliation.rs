use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::erp::PostedInvoiceLine;

/// Why an invoice line's `order_no` did not resolve to a local order
/// number. Callers decide whether to skip the line or fail; the two
/// cases are logged distinctly because an empty reference is routine
/// (manually keyed invoices) while a malformed one points at bad data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderReferenceError {
    #[error("order reference is empty")]
    Empty,
    #[error("order reference '{0}' is not a valid order number")]
    Malformed(String),
}

/// Parses the free-text `order_no` carried on posted invoice lines into
/// a local order number. Only positive integers qualify.
pub fn parse_order_reference(reference: &str) -> Result<i64, OrderReferenceError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(OrderReferenceError::Empty);
    }
    match trimmed.parse::<i64>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(OrderReferenceError::Malformed(trimmed.to_string())),
    }
}

/// Groups posted invoice lines by the local order number their
/// `order_no` parses to. Unparseable references are skipped with a log,
/// never propagated as errors.
pub fn group_lines_by_order(lines: &[PostedInvoiceLine]) -> HashMap<i64, Vec<PostedInvoiceLine>> {
    let mut grouped: HashMap<i64, Vec<PostedInvoiceLine>> = HashMap::new();
    for line in lines {
        match parse_order_reference(&line.order_no) {
            Ok(order_number) => grouped.entry(order_number).or_default().push(line.clone()),
            Err(OrderReferenceError::Empty) => {
                debug!(
                    document_no = %line.document_no,
                    "Invoice line carries no order reference; skipping"
                );
            }
            Err(OrderReferenceError::Malformed(reference)) => {
                warn!(
                    document_no = %line.document_no,
                    reference = %reference,
                    "Invoice line carries a malformed order reference; skipping"
                );
            }
        }
    }
    grouped
}

/// True when any posted invoice line references the given order.
pub fn is_order_invoiced(order_number: i64, lines: &[PostedInvoiceLine]) -> bool {
    lines
        .iter()
        .any(|line| parse_order_reference(&line.order_no) == Ok(order_number))
}
