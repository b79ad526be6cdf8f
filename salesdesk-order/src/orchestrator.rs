use chrono::Utc;
use rust_decimal::Decimal;
use salesdesk_core::{
    ComposerIdentity, ErpOrderRequest, ErpOrderService, GatewayError, LocalOrderRequest,
    LocalOrderStore, OrderReference,
};
use salesdesk_shared::{OrderCommittedEvent, PartialCommitEvent};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::builder::BuilderError;
use crate::ledger::LedgerError;
use crate::models::{ComposeStatus, OrderLine};
use crate::session::ComposeSession;

/// Status written to the local record of every order committed here.
pub const DEFAULT_STATUS_MARKER: &str = "submitted";

/// ERP state assumed when the order service does not report one.
pub const DEFAULT_ERP_STATE: &str = "draft";

/// Everything both phases need, captured when the commit began so the
/// session can be released while the network calls run.
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub session_id: Uuid,
    pub customer_name: String,
    pub status_marker: String,
    pub erp: ErpOrderRequest,
    pub lines: Vec<OrderLine>,
    pub amount_total: Decimal,
}

impl CommitPlan {
    pub fn local_request(&self, reference: &OrderReference) -> LocalOrderRequest {
        LocalOrderRequest {
            customer_id: self.erp.customer_id.clone(),
            customer_name: self.customer_name.clone(),
            territory_id: self.erp.territory_id.clone(),
            delivery_address: self.erp.delivery_address.clone(),
            policy_type: self.erp.policy_type,
            warehouse_id: self.erp.warehouse_id.clone(),
            employee_id: self.erp.employee_id.clone(),
            company_id: self.erp.company_id.clone(),
            order_id: reference.order_id.clone(),
            order_sequence: reference.order_sequence.clone(),
            status: self.status_marker.clone(),
            odoo_status: reference
                .state
                .clone()
                .unwrap_or_else(|| DEFAULT_ERP_STATE.to_string()),
            amount_total: self.amount_total,
            lines: self.lines.iter().map(OrderLine::to_local_line).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReceipt {
    pub local_id: String,
    pub reference: OrderReference,
    pub line_count: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_total: Decimal,
    pub event: OrderCommittedEvent,
}

/// Sequences the two writes: the external order service first, then the
/// local datastore. There is no compensation: a local failure after the ERP
/// accepted the order is reported as [`CommitError::PartialCommit`].
pub struct CommitOrchestrator {
    erp: Arc<dyn ErpOrderService>,
    store: Arc<dyn LocalOrderStore>,
    identity: ComposerIdentity,
    status_marker: String,
}

impl CommitOrchestrator {
    pub fn new(
        erp: Arc<dyn ErpOrderService>,
        store: Arc<dyn LocalOrderStore>,
        identity: ComposerIdentity,
    ) -> Self {
        Self {
            erp,
            store,
            identity,
            status_marker: DEFAULT_STATUS_MARKER.to_string(),
        }
    }

    pub fn with_status_marker(mut self, marker: impl Into<String>) -> Self {
        self.status_marker = marker.into();
        self
    }

    /// Local validation and the move to `Committing`.
    pub fn prepare(&self, session: &mut ComposeSession) -> Result<CommitPlan, CommitError> {
        session.begin_commit(&self.identity, &self.status_marker)
    }

    /// Run both phases for a prepared plan.
    pub async fn execute(&self, plan: &CommitPlan) -> Result<CommitReceipt, CommitError> {
        let ack = self.erp.submit_order(&plan.erp).await.map_err(|err| {
            tracing::warn!(session_id = %plan.session_id, error = %err, "Order service rejected submission");
            CommitError::Network(err)
        })?;

        let raw = ack.clone();
        let reference = ack.into_reference().ok_or_else(|| {
            tracing::error!(
                session_id = %plan.session_id,
                order_id = ?raw.order_id,
                order_sequence = ?raw.order_sequence,
                "Order service response lacks order identity; local write skipped"
            );
            CommitError::MissingOrderReference {
                order_id: raw.order_id,
                order_sequence: raw.order_sequence,
            }
        })?;

        tracing::info!(
            session_id = %plan.session_id,
            order_id = %reference.order_id,
            order_sequence = %reference.order_sequence,
            "External order created"
        );

        let local = plan.local_request(&reference);
        match self.store.create_order(&local).await {
            Ok(local_id) => {
                let event = OrderCommittedEvent {
                    session_id: plan.session_id,
                    order_id: reference.order_id.clone(),
                    order_sequence: reference.order_sequence.clone(),
                    local_id: local_id.clone(),
                    line_count: plan.lines.len(),
                    amount_total: plan.amount_total,
                    committed_at: Utc::now(),
                };
                tracing::info!(?event, "Order committed");
                Ok(CommitReceipt {
                    local_id,
                    reference,
                    line_count: plan.lines.len(),
                    amount_total: plan.amount_total,
                    event,
                })
            }
            Err(err) => {
                let event = PartialCommitEvent {
                    session_id: Some(plan.session_id),
                    local_id: None,
                    order_id: reference.order_id.clone(),
                    order_sequence: reference.order_sequence.clone(),
                    reason: err.to_string(),
                    occurred_at: Utc::now(),
                };
                tracing::error!(?event, "External order has no local record");
                Err(CommitError::PartialCommit {
                    order_id: reference.order_id,
                    order_sequence: reference.order_sequence,
                    source: err,
                })
            }
        }
    }

    /// Prepare, execute and record the outcome on a session the caller owns.
    pub async fn commit(&self, session: &mut ComposeSession) -> Result<CommitReceipt, CommitError> {
        let plan = self.prepare(session)?;
        let outcome = self.execute(&plan).await;
        if let Err(err) = session.finish_commit(&outcome) {
            tracing::error!(session_id = %session.id(), error = %err, "Could not record commit outcome");
        }
        outcome
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CommitError {
    #[error("Cannot commit without {0}")]
    MissingContext(&'static str),

    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("A commit is already in progress")]
    AlreadyInFlight,

    #[error("Cannot commit a session in state {0:?}")]
    InvalidState(ComposeStatus),

    #[error("Draft line rejected: {0}")]
    Rejected(#[from] BuilderError),

    #[error(transparent)]
    Balance(#[from] LedgerError),

    #[error("Order service call failed: {0}")]
    Network(#[source] GatewayError),

    #[error("Order service did not return an order id and sequence")]
    MissingOrderReference {
        order_id: Option<String>,
        order_sequence: Option<String>,
    },

    #[error("Order {order_sequence} ({order_id}) was created externally but not recorded locally: {source}")]
    PartialCommit {
        order_id: String,
        order_sequence: String,
        #[source]
        source: GatewayError,
    },
}

impl CommitError {
    /// Rejected locally before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CommitError::MissingContext(_)
                | CommitError::NothingToCommit
                | CommitError::Rejected(_)
                | CommitError::Balance(_)
        )
    }
}
