pub mod identity;
pub mod lookup;
pub mod order_service;
pub mod local_store;

pub use identity::ComposerIdentity;
pub use local_store::{LocalOrderLine, LocalOrderRequest, LocalOrderStore, SalesOrder, WarehouseAssignment};
pub use lookup::LookupGateway;
pub use order_service::{ErpConfirmRequest, ErpOrderAck, ErpOrderLine, ErpOrderRequest, ErpOrderService, OrderReference};

/// Failure talking to one of the remote systems. Every variant names the
/// service so callers can tell the ERP from the local API.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GatewayError {
    #[error("Cannot reach {service}: {message}")]
    Unreachable { service: String, message: String },

    #[error("Request to {service} timed out")]
    Timeout { service: String },

    #[error("{service} answered HTTP {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Malformed response from {service}: {message}")]
    Decode { service: String, message: String },
}

impl GatewayError {
    pub fn decode(service: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn service(&self) -> &str {
        match self {
            GatewayError::Unreachable { service, .. }
            | GatewayError::Timeout { service }
            | GatewayError::Status { service, .. }
            | GatewayError::Decode { service, .. } => service,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
