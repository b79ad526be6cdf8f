pub mod models;
pub mod secret;

pub use models::events::{OrderCommittedEvent, PartialCommitEvent, WarehouseAssignedEvent};
pub use secret::Masked;
