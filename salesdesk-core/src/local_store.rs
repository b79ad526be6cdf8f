use async_trait::async_trait;
use rust_decimal::Decimal;
use salesdesk_catalog::PolicyType;
use serde::{Deserialize, Serialize};

use crate::order_service::ErpOrderLine;
use crate::GatewayResult;

/// A committed line as the local datastore keeps it, labels included so
/// reports never need to re-resolve catalog names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalOrderLine {
    #[serde(flatten)]
    pub line: ErpOrderLine,
    pub policy_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_policy_code: Option<String>,
    pub product_name: String,
    pub packaging_name: String,
}

/// Phase-2 payload: the compose data plus the identity the ERP issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalOrderRequest {
    pub customer_id: String,
    pub customer_name: String,
    pub territory_id: String,
    pub delivery_address: String,
    pub policy_type: PolicyType,
    pub warehouse_id: String,
    pub employee_id: String,
    pub company_id: String,
    pub order_id: String,
    pub order_sequence: String,
    pub status: String,
    #[serde(rename = "odooStatus")]
    pub odoo_status: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_total: Decimal,
    pub lines: Vec<LocalOrderLine>,
}

/// Warehouse patch for an order that arrived without one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarehouseAssignment {
    pub warehouse_id: String,
    pub order_id: String,
    pub order_sequence: String,
    #[serde(rename = "odooStatus")]
    pub odoo_status: String,
}

/// Persisted sales order as read back from the local datastore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesOrder {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_sequence: Option<String>,
    pub customer_id: String,
    #[serde(default)]
    pub lines: Vec<LocalOrderLine>,
    pub status: String,
    #[serde(rename = "odooStatus", alias = "odoo_status", default)]
    pub odoo_status: Option<String>,
    #[serde(default)]
    pub warehouse_id: Option<String>,
}

impl SalesOrder {
    pub fn has_warehouse(&self) -> bool {
        self.warehouse_id
            .as_deref()
            .is_some_and(|w| !w.trim().is_empty())
    }
}

/// The application's own datastore, authoritative for status and reporting.
#[async_trait]
pub trait LocalOrderStore: Send + Sync {
    /// Persist a committed order; returns the local identifier.
    async fn create_order(&self, request: &LocalOrderRequest) -> GatewayResult<String>;

    async fn get_order(&self, local_id: &str) -> GatewayResult<SalesOrder>;

    async fn assign_warehouse(
        &self,
        local_id: &str,
        assignment: &WarehouseAssignment,
    ) -> GatewayResult<()>;
}
