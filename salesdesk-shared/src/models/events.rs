use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Both phases succeeded for a composed order.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderCommittedEvent {
    pub session_id: Uuid,
    pub order_id: String,
    pub order_sequence: String,
    pub local_id: String,
    pub line_count: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_total: Decimal,
    pub committed_at: DateTime<Utc>,
}

/// The external order exists but the local write (order record or warehouse
/// patch) failed.
/// Carries everything needed to reconcile by hand.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PartialCommitEvent {
    pub session_id: Option<Uuid>,
    pub local_id: Option<String>,
    pub order_id: String,
    pub order_sequence: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WarehouseAssignedEvent {
    pub local_id: String,
    pub order_id: String,
    pub order_sequence: String,
    pub warehouse_id: String,
    pub assigned_at: DateTime<Utc>,
}
