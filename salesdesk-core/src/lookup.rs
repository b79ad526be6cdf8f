use async_trait::async_trait;
use salesdesk_catalog::{
    Customer, Packaging, Policy, PolicyType, PriceQuote, Product, ReferencePolicy, Territory,
    Warehouse,
};

use crate::GatewayResult;

/// Read side of the selection chain. Every call is an idempotent GET keyed by
/// the upstream choice.
#[async_trait]
pub trait LookupGateway: Send + Sync {
    async fn territories(&self) -> GatewayResult<Vec<Territory>>;

    async fn customers(&self, territory_id: &str) -> GatewayResult<Vec<Customer>>;

    /// Balances of every policy the customer holds under `policy_type`.
    async fn policies(
        &self,
        customer_id: &str,
        policy_type: PolicyType,
    ) -> GatewayResult<Vec<Policy>>;

    /// Candidate reference policies for a secure-credit purchase.
    async fn reference_policies(&self, customer_id: &str) -> GatewayResult<Vec<ReferencePolicy>>;

    /// Server-side cross-reference: which of `candidate_codes` may fund
    /// purchases made under `policy_id`.
    async fn allowed_reference_codes(
        &self,
        policy_id: &str,
        candidate_codes: &[String],
    ) -> GatewayResult<Vec<String>>;

    async fn products(
        &self,
        policy_id: &str,
        reference_policy_id: Option<&str>,
    ) -> GatewayResult<Vec<Product>>;

    async fn packagings(&self, product_id: &str) -> GatewayResult<Vec<Packaging>>;

    async fn price_quote(
        &self,
        customer_id: &str,
        policy_id: &str,
        product_id: &str,
    ) -> GatewayResult<PriceQuote>;

    async fn warehouses(&self) -> GatewayResult<Vec<Warehouse>>;
}
