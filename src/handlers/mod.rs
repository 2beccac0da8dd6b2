pub mod directory;
pub mod invoices;
pub mod orders;

use std::sync::Arc;

use crate::config::OrderPolicyConfig;
use crate::db::DbPool;
use crate::erp::ErpClient;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<crate::services::orders::OrderService>,
    pub reporting: Arc<crate::services::reporting::ReportingService>,
    pub erp: Arc<ErpClient>,
}

impl AppServices {
    /// Wires the service graph from the shared handles.
    pub fn new(
        db_pool: Arc<DbPool>,
        erp: Arc<ErpClient>,
        policy: OrderPolicyConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let users = crate::services::users::UserDirectoryService::new(db_pool.clone());
        let validation = crate::services::validation::ValidationService::new(erp.clone(), policy);

        let orders = Arc::new(crate::services::orders::OrderService::new(
            db_pool.clone(),
            erp.clone(),
            users.clone(),
            validation,
            event_sender,
        ));
        let reporting = Arc::new(crate::services::reporting::ReportingService::new(
            db_pool,
            erp.clone(),
            users,
            policy,
        ));

        Self {
            orders,
            reporting,
            erp,
        }
    }
}
