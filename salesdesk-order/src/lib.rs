pub mod builder;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod resolver;
pub mod selection;
pub mod session;
pub mod warehouse;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use builder::{BuilderError, DraftField, LineItemBuilder};
pub use ledger::{BalanceSnapshot, LedgerError, PolicyLedger};
pub use models::{ComposeStatus, DraftLine, LineId, OrderLine};
pub use orchestrator::{CommitError, CommitOrchestrator, CommitPlan, CommitReceipt};
pub use resolver::{ResolveError, SelectionResolver};
pub use selection::{FetchRequest, FetchTicket, Fetched, Resolution, Selection, Slot, SlotState, Stage};
pub use session::{ApplyOutcome, ComposeSession, SessionError, SessionSnapshot};
pub use warehouse::{AssignmentError, AssignmentReceipt, WarehouseAssignmentOrchestrator};
