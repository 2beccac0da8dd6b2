use std::time::Instant;

use serde::de::DeserializeOwned;
use tracing::{error, instrument};

use crate::config::ErpConfig;
use crate::errors::ServiceError;

pub mod dtos;
pub mod token;

pub use dtos::{
    Customer, InventoryBalance, Item, Location, ODataCollection, PostedInvoiceLine, SalesOrderCreated,
    SalesOrderLine, SalesOrderPayload, SalesPerson, SalesPrice,
};

use token::TokenCache;

/// HTTP client for the ERP's OData-style directory API. Owns the bearer
/// token cache; every call authenticates, fetches a whole collection and
/// maps any failure to `ServiceError::ExternalServiceError` naming the
/// collection.
pub struct ErpClient {
    http: reqwest::Client,
    config: ErpConfig,
    token: TokenCache,
}

impl ErpClient {
    pub fn new(config: ErpConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build ERP HTTP client: {}", e))
            })?;
        Ok(Self::with_client(config, http))
    }

    /// Build a client from an existing reqwest client (useful for testing).
    pub fn with_client(config: ErpConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            config,
            token: TokenCache::new(),
        }
    }

    pub async fn get_customers(&self) -> Result<Vec<Customer>, ServiceError> {
        self.get_collection("Customers", "customers").await
    }

    pub async fn get_locations(&self) -> Result<Vec<Location>, ServiceError> {
        self.get_collection("Locations", "locations").await
    }

    pub async fn get_sales_people(&self) -> Result<Vec<SalesPerson>, ServiceError> {
        self.get_collection("SalesPeople", "salespeople").await
    }

    pub async fn get_items(&self) -> Result<Vec<Item>, ServiceError> {
        self.get_collection("Items", "items").await
    }

    pub async fn get_inventory(&self) -> Result<Vec<InventoryBalance>, ServiceError> {
        self.get_collection("InventoryBalances", "inventory balances")
            .await
    }

    pub async fn get_sales_prices(&self) -> Result<Vec<SalesPrice>, ServiceError> {
        self.get_collection("SalesPrices", "sales prices").await
    }

    pub async fn get_posted_invoice_lines(&self) -> Result<Vec<PostedInvoiceLine>, ServiceError> {
        self.get_collection("PostedSalesInvoiceLines", "posted invoice lines")
            .await
    }

    /// Pushes a sales order to the ERP and returns the document number it
    /// was created under.
    #[instrument(skip(self, payload), fields(external_doc = %payload.external_document_number))]
    pub async fn post_sales_order(
        &self,
        payload: &SalesOrderPayload,
    ) -> Result<String, ServiceError> {
        let token = self.token.bearer(&self.http, &self.config).await?;
        let url = self.collection_url("SalesOrders");
        let started = Instant::now();
        metrics::counter!("salesdesk_erp.requests", 1);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("salesdesk_erp.request_failures", 1);
                error!(error = %e, "ERP sales order push failed");
                ServiceError::ExternalServiceError(format!(
                    "Failed to push sales order to ERP: {}",
                    e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.token.invalidate().await;
            }
            let body = response.text().await.unwrap_or_default();
            metrics::counter!("salesdesk_erp.request_failures", 1);
            error!(status = %status, body = %body, "ERP rejected sales order push");
            return Err(ServiceError::ExternalServiceError(format!(
                "ERP returned {} posting sales order",
                status
            )));
        }

        let created: SalesOrderCreated = response.json().await.map_err(|e| {
            error!(error = %e, "ERP sales order response could not be parsed");
            ServiceError::ExternalServiceError(format!(
                "Invalid ERP sales order response: {}",
                e
            ))
        })?;

        metrics::histogram!("salesdesk_erp.request_duration", started.elapsed());
        Ok(created.no)
    }

    async fn get_collection<T: DeserializeOwned>(
        &self,
        path: &str,
        label: &str,
    ) -> Result<Vec<T>, ServiceError> {
        let token = self.token.bearer(&self.http, &self.config).await?;
        let url = self.collection_url(path);
        let started = Instant::now();
        metrics::counter!("salesdesk_erp.requests", 1);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("salesdesk_erp.request_failures", 1);
                error!(collection = label, error = %e, "ERP request failed");
                ServiceError::ExternalServiceError(format!(
                    "Failed to fetch {} from ERP: {}",
                    label, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.token.invalidate().await;
            }
            metrics::counter!("salesdesk_erp.request_failures", 1);
            error!(collection = label, status = %status, "ERP returned an error");
            return Err(ServiceError::ExternalServiceError(format!(
                "ERP returned {} for {}",
                status, label
            )));
        }

        let page: ODataCollection<T> = response.json().await.map_err(|e| {
            error!(collection = label, error = %e, "ERP response could not be parsed");
            ServiceError::ExternalServiceError(format!("Invalid ERP response for {}: {}", label, e))
        })?;

        metrics::histogram!("salesdesk_erp.request_duration", started.elapsed());
        Ok(page.value)
    }

    fn collection_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_against(server: &MockServer) -> ErpClient {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "expires_in": 3600
            })))
            .mount(server)
            .await;

        let config = ErpConfig {
            base_url: server.uri(),
            token_url: format!("{}/token", server.uri()),
            client_secret: "secret".to_string(),
            ..ErpConfig::default()
        };
        ErpClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn fetches_customers_with_bearer_token() {
        let server = MockServer::start().await;
        let client = client_against(&server).await;

        Mock::given(method("GET"))
            .and(path("/Customers"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"no": "CUST-01", "name": "Contoso Ltd", "creditAllowed": true,
                     "creditLimit": "5000", "balance": "100"}
                ]
            })))
            .mount(&server)
            .await;

        let customers = client.get_customers().await.unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].no, "CUST-01");
        assert_eq!(customers[0].credit_limit, dec!(5000));
    }

    #[tokio::test]
    async fn failed_fetch_names_the_collection() {
        let server = MockServer::start().await;
        let client = client_against(&server).await;

        Mock::given(method("GET"))
            .and(path("/InventoryBalances"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client.get_inventory().await.unwrap_err();
        match err {
            ServiceError::ExternalServiceError(message) => {
                assert!(message.contains("inventory balances"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn sales_order_push_returns_the_erp_document_number() {
        let server = MockServer::start().await;
        let client = client_against(&server).await;

        Mock::given(method("POST"))
            .and(path("/SalesOrders"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"no": "SO-1042"})))
            .mount(&server)
            .await;

        let payload = SalesOrderPayload {
            customer_no: "CUST-01".to_string(),
            location_code: "MAIN".to_string(),
            order_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            external_document_number: "1001".to_string(),
            payment_terms_code: String::new(),
            payment_method_code: String::new(),
            lines: vec![],
        };

        let document_no = client.post_sales_order(&payload).await.unwrap();
        assert_eq!(document_no, "SO-1042");
    }
}
