use async_trait::async_trait;
use rust_decimal::Decimal;
use salesdesk_catalog::PolicyType;
use serde::{Deserialize, Serialize};

use crate::GatewayResult;

/// One line as the external order service expects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErpOrderLine {
    pub policy_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_policy_id: Option<String>,
    pub product_id: String,
    pub packaging_id: String,
    pub pack_count: u32,
    pub unit_qty: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

/// Phase-1 payload for an order composed in this application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErpOrderRequest {
    pub customer_id: String,
    pub territory_id: String,
    pub delivery_address: String,
    pub policy_type: PolicyType,
    pub warehouse_id: String,
    pub employee_id: String,
    pub company_id: String,
    pub lines: Vec<ErpOrderLine>,
}

/// Phase-1 payload confirming an order that reached the ERP through another
/// channel, now that it has a warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErpConfirmRequest {
    pub local_id: String,
    pub customer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub warehouse_id: String,
    pub employee_id: String,
    pub company_id: String,
}

/// What the order service answered, before any checks. Either identifier may
/// be missing or blank in a response that still carried a success status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErpOrderAck {
    pub order_id: Option<String>,
    pub order_sequence: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Identity the ERP issued for an order. Both fields are guaranteed non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderReference {
    pub order_id: String,
    pub order_sequence: String,
    pub state: Option<String>,
}

impl ErpOrderAck {
    /// Returns the reference only if both identifiers are present and non-blank.
    pub fn into_reference(self) -> Option<OrderReference> {
        let order_id = self.order_id.filter(|s| !s.trim().is_empty())?;
        let order_sequence = self.order_sequence.filter(|s| !s.trim().is_empty())?;
        Some(OrderReference {
            order_id,
            order_sequence,
            state: self.state,
        })
    }
}

/// The external system of record for order identity.
#[async_trait]
pub trait ErpOrderService: Send + Sync {
    /// Create a sales order from a composed line list.
    async fn submit_order(&self, request: &ErpOrderRequest) -> GatewayResult<ErpOrderAck>;

    /// Create or confirm an order received from another channel.
    async fn confirm_order(&self, request: &ErpConfirmRequest) -> GatewayResult<ErpOrderAck>;
}
