use chrono::Utc;
use salesdesk_catalog::Warehouse;
use salesdesk_core::{
    ComposerIdentity, ErpConfirmRequest, ErpOrderService, GatewayError, LocalOrderStore,
    OrderReference, WarehouseAssignment,
};
use salesdesk_shared::{PartialCommitEvent, WarehouseAssignedEvent};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::orchestrator::DEFAULT_ERP_STATE;

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentReceipt {
    pub local_id: String,
    pub reference: OrderReference,
    pub event: WarehouseAssignedEvent,
}

/// Gives a warehouse to an order that reached the local datastore from
/// another channel. Same two-phase shape as a composed commit, keyed by the
/// existing local order id: the ERP confirms first, then the local record
/// is patched.
pub struct WarehouseAssignmentOrchestrator {
    erp: Arc<dyn ErpOrderService>,
    store: Arc<dyn LocalOrderStore>,
    identity: ComposerIdentity,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases the per-order guard however the assignment ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    local_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.local_id);
    }
}

impl WarehouseAssignmentOrchestrator {
    pub fn new(
        erp: Arc<dyn ErpOrderService>,
        store: Arc<dyn LocalOrderStore>,
        identity: ComposerIdentity,
    ) -> Self {
        Self {
            erp,
            store,
            identity,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn assign(
        &self,
        local_id: &str,
        warehouse: &Warehouse,
    ) -> Result<AssignmentReceipt, AssignmentError> {
        let _guard = self.claim(local_id)?;

        let order = self
            .store
            .get_order(local_id)
            .await
            .map_err(AssignmentError::Network)?;
        if order.has_warehouse() {
            return Err(AssignmentError::AlreadyAssigned {
                local_id: local_id.to_string(),
                warehouse_id: order.warehouse_id.unwrap_or_default(),
            });
        }

        let request = ErpConfirmRequest {
            local_id: local_id.to_string(),
            customer_id: order.customer_id.clone(),
            order_id: order.order_id.clone().filter(|id| !id.trim().is_empty()),
            warehouse_id: warehouse.id.clone(),
            employee_id: self.identity.employee_id.clone(),
            company_id: self.identity.company_id.clone(),
        };
        let ack = self.erp.confirm_order(&request).await.map_err(|err| {
            tracing::warn!(local_id, error = %err, "Order service rejected confirmation");
            AssignmentError::Network(err)
        })?;

        let raw = ack.clone();
        let reference = ack.into_reference().ok_or_else(|| {
            tracing::error!(
                local_id,
                order_id = ?raw.order_id,
                order_sequence = ?raw.order_sequence,
                "Confirmation lacks order identity; warehouse not recorded"
            );
            AssignmentError::MissingOrderReference {
                order_id: raw.order_id,
                order_sequence: raw.order_sequence,
            }
        })?;

        let assignment = WarehouseAssignment {
            warehouse_id: warehouse.id.clone(),
            order_id: reference.order_id.clone(),
            order_sequence: reference.order_sequence.clone(),
            odoo_status: reference
                .state
                .clone()
                .unwrap_or_else(|| DEFAULT_ERP_STATE.to_string()),
        };

        if let Err(err) = self.store.assign_warehouse(local_id, &assignment).await {
            let event = PartialCommitEvent {
                session_id: None,
                local_id: Some(local_id.to_string()),
                order_id: reference.order_id.clone(),
                order_sequence: reference.order_sequence.clone(),
                reason: err.to_string(),
                occurred_at: Utc::now(),
            };
            tracing::error!(?event, "Confirmed order has no warehouse locally");
            return Err(AssignmentError::PartialCommit {
                local_id: local_id.to_string(),
                order_id: reference.order_id,
                order_sequence: reference.order_sequence,
                source: err,
            });
        }

        let event = WarehouseAssignedEvent {
            local_id: local_id.to_string(),
            order_id: reference.order_id.clone(),
            order_sequence: reference.order_sequence.clone(),
            warehouse_id: warehouse.id.clone(),
            assigned_at: Utc::now(),
        };
        tracing::info!(?event, "Warehouse assigned");

        Ok(AssignmentReceipt {
            local_id: local_id.to_string(),
            reference,
            event,
        })
    }

    fn claim(&self, local_id: &str) -> Result<InFlight<'_>, AssignmentError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(local_id.to_string()) {
            return Err(AssignmentError::AlreadyInFlight(local_id.to_string()));
        }
        Ok(InFlight {
            set: &self.in_flight,
            local_id: local_id.to_string(),
        })
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum AssignmentError {
    #[error("Order {local_id} already has warehouse {warehouse_id}")]
    AlreadyAssigned {
        local_id: String,
        warehouse_id: String,
    },

    #[error("Warehouse assignment for order {0} is already in progress")]
    AlreadyInFlight(String),

    #[error("Unknown warehouse: {0}")]
    UnknownWarehouse(String),

    #[error("Order service call failed: {0}")]
    Network(#[source] GatewayError),

    #[error("Order service did not return an order id and sequence")]
    MissingOrderReference {
        order_id: Option<String>,
        order_sequence: Option<String>,
    },

    #[error("Order {order_sequence} ({order_id}) was confirmed but local order {local_id} was not updated: {source}")]
    PartialCommit {
        local_id: String,
        order_id: String,
        order_sequence: String,
        #[source]
        source: GatewayError,
    },
}
