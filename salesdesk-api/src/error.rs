use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use salesdesk_core::GatewayError;
use salesdesk_order::{
    AssignmentError, BuilderError, CommitError, LedgerError, ResolveError, SessionError,
};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Validation(&'static str, String),
    Conflict(&'static str, String),
    Upstream(&'static str, String),
    /// The ERP holds an order the local store does not know about.
    PartialCommit {
        message: String,
        order_id: String,
        order_sequence: String,
        local_id: Option<String>,
    },
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({"error": msg, "kind": "not_found"}),
            ),
            AppError::Validation(kind, msg) => (
                StatusCode::BAD_REQUEST,
                json!({"error": msg, "kind": kind}),
            ),
            AppError::Conflict(kind, msg) => {
                (StatusCode::CONFLICT, json!({"error": msg, "kind": kind}))
            }
            AppError::Upstream(kind, msg) => (
                StatusCode::BAD_GATEWAY,
                json!({"error": msg, "kind": kind}),
            ),
            AppError::PartialCommit {
                message,
                order_id,
                order_sequence,
                local_id,
            } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": message,
                    "kind": "partial_commit",
                    "order_id": order_id,
                    "order_sequence": order_sequence,
                    "local_id": local_id,
                }),
            ),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "Internal Server Error", "kind": "internal"}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let kind = match err {
            GatewayError::Unreachable { .. } => "unreachable",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Status { .. } => "upstream_status",
            GatewayError::Decode { .. } => "upstream_decode",
        };
        AppError::Upstream(kind, err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let kind = match err {
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::UnknownBalance(_) => "unknown_balance",
            LedgerError::Overflow(_) => "amount_out_of_range",
        };
        AppError::Validation(kind, err.to_string())
    }
}

impl From<BuilderError> for AppError {
    fn from(err: BuilderError) -> Self {
        let msg = err.to_string();
        match err {
            BuilderError::MissingField(_) => AppError::Validation("missing_field", msg),
            BuilderError::ReadOnlyField(_) => AppError::Validation("read_only_field", msg),
            BuilderError::SelectionField(_) => AppError::Validation("selection_field", msg),
            BuilderError::UnknownField(_) => AppError::Validation("unknown_field", msg),
            BuilderError::InvalidValue { .. } => AppError::Validation("invalid_value", msg),
            BuilderError::LineNotFound(_) => AppError::NotFound(msg),
            BuilderError::Ledger(ledger) => ledger.into(),
        }
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        let msg = err.to_string();
        match err {
            ResolveError::MissingUpstream(_) => AppError::Validation("missing_upstream", msg),
            ResolveError::NotResolved(_) => AppError::Validation("not_resolved", msg),
            ResolveError::UnknownOption { .. } => AppError::Validation("unknown_option", msg),
            ResolveError::PolicyExhausted => AppError::Validation("policy_exhausted", msg),
            ResolveError::NoReferencePolicy => AppError::Validation("no_reference_policy", msg),
            ResolveError::NotSecureCredit => AppError::Validation("not_secure_credit", msg),
            ResolveError::InvalidQuote(_) => AppError::Upstream("invalid_quote", msg),
            ResolveError::Network(gateway) => gateway.into(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let msg = err.to_string();
        match err {
            SessionError::Locked(_) => AppError::Conflict("session_locked", msg),
            SessionError::InvalidTransition { .. } => AppError::Conflict("invalid_transition", msg),
            SessionError::Resolve(resolve) => resolve.into(),
            SessionError::Builder(builder) => builder.into(),
        }
    }
}

impl From<CommitError> for AppError {
    fn from(err: CommitError) -> Self {
        let msg = err.to_string();
        match err {
            CommitError::MissingContext(_) => AppError::Validation("missing_context", msg),
            CommitError::NothingToCommit => AppError::Validation("nothing_to_commit", msg),
            CommitError::AlreadyInFlight => AppError::Conflict("commit_in_flight", msg),
            CommitError::InvalidState(_) => AppError::Conflict("invalid_state", msg),
            CommitError::Rejected(builder) => builder.into(),
            CommitError::Balance(ledger) => ledger.into(),
            CommitError::Network(gateway) => gateway.into(),
            CommitError::MissingOrderReference { .. } => {
                AppError::Upstream("missing_order_reference", msg)
            }
            CommitError::PartialCommit {
                order_id,
                order_sequence,
                ..
            } => AppError::PartialCommit {
                message: msg,
                order_id,
                order_sequence,
                local_id: None,
            },
        }
    }
}

impl From<AssignmentError> for AppError {
    fn from(err: AssignmentError) -> Self {
        let msg = err.to_string();
        match err {
            AssignmentError::AlreadyAssigned { .. } => AppError::Conflict("already_assigned", msg),
            AssignmentError::AlreadyInFlight(_) => AppError::Conflict("assignment_in_flight", msg),
            AssignmentError::UnknownWarehouse(_) => AppError::Validation("unknown_warehouse", msg),
            AssignmentError::Network(gateway) => gateway.into(),
            AssignmentError::MissingOrderReference { .. } => {
                AppError::Upstream("missing_order_reference", msg)
            }
            AssignmentError::PartialCommit {
                local_id,
                order_id,
                order_sequence,
                ..
            } => AppError::PartialCommit {
                message: msg,
                order_id,
                order_sequence,
                local_id: Some(local_id),
            },
        }
    }
}
