use async_trait::async_trait;
use reqwest::Method;
use salesdesk_catalog::{
    Customer, Packaging, Policy, PolicyType, PriceQuote, Product, ReferencePolicy, Territory,
    Warehouse,
};
use salesdesk_core::{
    GatewayError, GatewayResult, LocalOrderRequest, LocalOrderStore, LookupGateway, SalesOrder,
    WarehouseAssignment,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::app_config::LocalApiConfig;
use crate::envelope::{decode_internal, lenient_string};
use crate::erp_client::ErpClient;
use crate::http::{Credential, HttpService};

pub const SERVICE: &str = "local-api";

/// Client for the application's own REST API (`{data: ...}` envelope).
#[derive(Debug, Clone)]
pub struct LocalApiClient {
    http: HttpService,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    #[serde(default, alias = "_id", deserialize_with = "lenient_string")]
    id: Option<String>,
}

impl LocalApiClient {
    pub fn new(config: &LocalApiConfig) -> Result<Self, GatewayError> {
        let credential = Credential::Bearer(config.token.clone());
        let http = HttpService::new(SERVICE, &config.base_url, config.timeout(), credential)?;
        Ok(Self { http })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> GatewayResult<T> {
        let body = self.http.get(path, query).await?;
        decode_internal(&body).map_err(|e| e.into_gateway(SERVICE))
    }

    pub async fn territories(&self) -> GatewayResult<Vec<Territory>> {
        self.fetch("/territories", &[]).await
    }

    pub async fn customers(&self, territory_id: &str) -> GatewayResult<Vec<Customer>> {
        self.fetch("/customers", &[("territory_id", territory_id)])
            .await
    }

    pub async fn policies(
        &self,
        customer_id: &str,
        policy_type: PolicyType,
    ) -> GatewayResult<Vec<Policy>> {
        self.fetch(
            &format!("/customers/{customer_id}/policies"),
            &[("policy_type", policy_type.as_str())],
        )
        .await
    }

    pub async fn reference_policies(
        &self,
        customer_id: &str,
    ) -> GatewayResult<Vec<ReferencePolicy>> {
        self.fetch(&format!("/customers/{customer_id}/reference-policies"), &[])
            .await
    }

    pub async fn products(
        &self,
        policy_id: &str,
        reference_policy_id: Option<&str>,
    ) -> GatewayResult<Vec<Product>> {
        let path = format!("/policies/{policy_id}/products");
        match reference_policy_id {
            Some(reference) => self.fetch(&path, &[("reference_policy_id", reference)]).await,
            None => self.fetch(&path, &[]).await,
        }
    }

    pub async fn packagings(&self, product_id: &str) -> GatewayResult<Vec<Packaging>> {
        self.fetch(&format!("/products/{product_id}/packagings"), &[])
            .await
    }

    pub async fn warehouses(&self) -> GatewayResult<Vec<Warehouse>> {
        self.fetch("/warehouses", &[]).await
    }
}

#[async_trait]
impl LocalOrderStore for LocalApiClient {
    async fn create_order(&self, request: &LocalOrderRequest) -> GatewayResult<String> {
        let body = self
            .http
            .send_json(Method::POST, "/sales-orders", request)
            .await?;
        let created: CreatedRecord = decode_internal(&body).map_err(|e| e.into_gateway(SERVICE))?;
        created
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| GatewayError::decode(SERVICE, "created order has no id"))
    }

    async fn get_order(&self, local_id: &str) -> GatewayResult<SalesOrder> {
        self.fetch(&format!("/sales-orders/{local_id}"), &[]).await
    }

    async fn assign_warehouse(
        &self,
        local_id: &str,
        assignment: &WarehouseAssignment,
    ) -> GatewayResult<()> {
        let body = self
            .http
            .send_json(
                Method::PUT,
                &format!("/sales-orders/{local_id}/warehouse"),
                assignment,
            )
            .await?;
        // the echoed record is not needed, but the envelope must be well formed
        let _: Value = decode_internal(&body).map_err(|e| e.into_gateway(SERVICE))?;
        Ok(())
    }
}

/// Routes the selection chain's reads to whichever backend owns them:
/// reference data lives in the local API, prices and the reference-policy
/// cross-check in the order service.
#[derive(Clone)]
pub struct HttpLookup {
    local: Arc<LocalApiClient>,
    erp: Arc<ErpClient>,
}

impl HttpLookup {
    pub fn new(local: Arc<LocalApiClient>, erp: Arc<ErpClient>) -> Self {
        Self { local, erp }
    }
}

#[async_trait]
impl LookupGateway for HttpLookup {
    async fn territories(&self) -> GatewayResult<Vec<Territory>> {
        self.local.territories().await
    }

    async fn customers(&self, territory_id: &str) -> GatewayResult<Vec<Customer>> {
        self.local.customers(territory_id).await
    }

    async fn policies(
        &self,
        customer_id: &str,
        policy_type: PolicyType,
    ) -> GatewayResult<Vec<Policy>> {
        self.local.policies(customer_id, policy_type).await
    }

    async fn reference_policies(&self, customer_id: &str) -> GatewayResult<Vec<ReferencePolicy>> {
        self.local.reference_policies(customer_id).await
    }

    async fn allowed_reference_codes(
        &self,
        policy_id: &str,
        candidate_codes: &[String],
    ) -> GatewayResult<Vec<String>> {
        self.erp
            .allowed_reference_codes(policy_id, candidate_codes)
            .await
    }

    async fn products(
        &self,
        policy_id: &str,
        reference_policy_id: Option<&str>,
    ) -> GatewayResult<Vec<Product>> {
        self.local.products(policy_id, reference_policy_id).await
    }

    async fn packagings(&self, product_id: &str) -> GatewayResult<Vec<Packaging>> {
        self.local.packagings(product_id).await
    }

    async fn price_quote(
        &self,
        customer_id: &str,
        policy_id: &str,
        product_id: &str,
    ) -> GatewayResult<PriceQuote> {
        self.erp
            .price_quote(customer_id, policy_id, product_id)
            .await
    }

    async fn warehouses(&self) -> GatewayResult<Vec<Warehouse>> {
        self.local.warehouses().await
    }
}
