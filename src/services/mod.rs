// Core services
pub mod orders;
pub mod reconciliation;
pub mod reporting;
pub mod users;
pub mod validation;
