use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use salesdesk_catalog::{PolicyType, Warehouse};
use salesdesk_core::{ComposerIdentity, ErpOrderRequest, OrderReference};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::builder::{BuilderError, DraftField, LineItemBuilder};
use crate::ledger::{BalanceSnapshot, PolicyLedger};
use crate::models::{ComposeStatus, DraftLine, LineId, OrderLine};
use crate::orchestrator::{CommitError, CommitPlan, CommitReceipt};
use crate::resolver::ResolveError;
use crate::selection::{FetchRequest, FetchTicket, Fetched, Resolution, Selection, Stage};

/// Whether a resolution was taken into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "stage", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied(Stage),
    /// The slot moved on since the ticket was issued; the response was dropped.
    Stale(Stage),
}

/// One composition session: the staged order, its selection context and the
/// draft line. Owned by whoever drives the session and threaded explicitly
/// through the resolver and the commit orchestrator.
#[derive(Debug, Clone)]
pub struct ComposeSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    status: ComposeStatus,
    selection: Selection,
    builder: LineItemBuilder,
    ledger: PolicyLedger,
    commit_in_flight: bool,
    last_commit_error: Option<String>,
    order_reference: Option<OrderReference>,
}

impl Default for ComposeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposeSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            status: ComposeStatus::Empty,
            selection: Selection::default(),
            builder: LineItemBuilder::new(),
            ledger: PolicyLedger::new(),
            commit_in_flight: false,
            last_commit_error: None,
            order_reference: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> ComposeStatus {
        self.status
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn draft(&self) -> &DraftLine {
        self.builder.draft()
    }

    pub fn staged(&self) -> &[OrderLine] {
        self.builder.staged()
    }

    pub fn ledger(&self) -> &PolicyLedger {
        &self.ledger
    }

    pub fn is_commit_in_flight(&self) -> bool {
        self.commit_in_flight
    }

    pub fn order_reference(&self) -> Option<&OrderReference> {
        self.order_reference.as_ref()
    }

    // ------------------------------------------------------------------
    // Selection chain
    // ------------------------------------------------------------------

    pub fn select_territory(&mut self, territory_id: &str) -> Result<FetchTicket, SessionError> {
        self.ensure_editable()?;
        self.selection.territory_id = Some(territory_id.to_string());
        self.selection.customer = None;
        self.clear_from_address();

        let ticket = self.selection.begin(FetchRequest::Customers {
            territory_id: territory_id.to_string(),
        });
        self.settle()?;
        Ok(ticket)
    }

    pub fn select_customer(&mut self, customer_id: &str) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let customers = self
            .selection
            .customers
            .ready()
            .ok_or(ResolveError::NotResolved(Stage::Customers))?;
        let customer = customers
            .iter()
            .find(|c| c.id == customer_id)
            .cloned()
            .ok_or_else(|| ResolveError::unknown("customer", customer_id))?;

        self.clear_from_address();
        let addresses = customer.delivery_addresses();
        if addresses.len() == 1 {
            self.selection.delivery_address = addresses.into_iter().next();
        }
        self.selection.customer = Some(customer);
        self.settle()
    }

    pub fn select_delivery_address(&mut self, address: &str) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let customer = self
            .selection
            .customer
            .as_ref()
            .ok_or(ResolveError::MissingUpstream("customer"))?;
        let address = customer
            .find_address(address)
            .ok_or_else(|| ResolveError::unknown("delivery_address", address))?;

        self.clear_from_address();
        self.selection.delivery_address = Some(address);
        self.settle()
    }

    pub fn select_policy_type(
        &mut self,
        policy_type: PolicyType,
    ) -> Result<FetchTicket, SessionError> {
        self.ensure_editable()?;
        let customer_id = self
            .selection
            .customer
            .as_ref()
            .map(|c| c.id.clone())
            .ok_or(ResolveError::MissingUpstream("customer"))?;
        if self.selection.delivery_address.is_none() {
            return Err(ResolveError::MissingUpstream("delivery_address").into());
        }

        self.selection.reset_from(Stage::PolicyBalances);
        self.selection.policy_type = Some(policy_type);
        self.builder.reset_draft();
        self.builder
            .draft_mut()
            .set_requires_reference(policy_type.requires_reference_policy());

        let ticket = self.selection.begin(FetchRequest::PolicyBalances {
            customer_id,
            policy_type,
        });
        self.settle()?;
        Ok(ticket)
    }

    pub fn select_policy(&mut self, policy_id: &str) -> Result<FetchTicket, SessionError> {
        self.ensure_editable()?;
        let policy_type = self
            .selection
            .policy_type
            .ok_or(ResolveError::MissingUpstream("policy_type"))?;
        let policy = self
            .selection
            .policies
            .ready()
            .ok_or(ResolveError::NotResolved(Stage::PolicyBalances))?
            .iter()
            .find(|p| p.id == policy_id)
            .cloned()
            .ok_or_else(|| ResolveError::unknown("policy", policy_id))?;
        if !policy.has_balance() {
            return Err(ResolveError::PolicyExhausted.into());
        }
        let customer_id = self.customer_id()?;

        self.selection.reset_from(Stage::ReferencePolicies);
        self.builder.set_field(DraftField::Policy(policy));

        let request = if policy_type.requires_reference_policy() {
            FetchRequest::ReferencePolicies {
                customer_id,
                policy_id: policy_id.to_string(),
            }
        } else {
            FetchRequest::Products {
                policy_id: policy_id.to_string(),
                reference_policy_id: None,
            }
        };
        let ticket = self.selection.begin(request);
        self.settle()?;
        Ok(ticket)
    }

    pub fn select_reference_policy(
        &mut self,
        reference_policy_id: &str,
    ) -> Result<FetchTicket, SessionError> {
        self.ensure_editable()?;
        if !self
            .selection
            .policy_type
            .is_some_and(|pt| pt.requires_reference_policy())
        {
            return Err(ResolveError::NotSecureCredit.into());
        }
        let policy_id = self
            .builder
            .draft()
            .policy
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or(ResolveError::MissingUpstream("policy"))?;
        let reference = self
            .selection
            .reference_policies
            .ready()
            .ok_or(ResolveError::NotResolved(Stage::ReferencePolicies))?
            .iter()
            .find(|r| r.id == reference_policy_id)
            .cloned()
            .ok_or_else(|| ResolveError::unknown("reference_policy", reference_policy_id))?;

        self.selection.reset_from(Stage::Products);
        self.builder.set_field(DraftField::ReferencePolicy(reference));

        let ticket = self.selection.begin(FetchRequest::Products {
            policy_id,
            reference_policy_id: Some(reference_policy_id.to_string()),
        });
        self.settle()?;
        Ok(ticket)
    }

    /// Returns the packaging and pricing lookups, in that order.
    pub fn select_product(&mut self, product_id: &str) -> Result<Vec<FetchTicket>, SessionError> {
        self.ensure_editable()?;
        let product = self
            .selection
            .products
            .ready()
            .ok_or(ResolveError::NotResolved(Stage::Products))?
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
            .ok_or_else(|| ResolveError::unknown("product", product_id))?;
        let policy_id = self
            .builder
            .draft()
            .policy
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or(ResolveError::MissingUpstream("policy"))?;
        let customer_id = self.customer_id()?;

        self.selection.reset_from(Stage::Packagings);
        self.builder.set_field(DraftField::Product(product));

        let packagings = self.selection.begin(FetchRequest::Packagings {
            product_id: product_id.to_string(),
        });
        let pricing = self.selection.begin(FetchRequest::Pricing {
            customer_id,
            policy_id,
            product_id: product_id.to_string(),
        });
        self.settle()?;
        Ok(vec![packagings, pricing])
    }

    pub fn select_packaging(&mut self, packaging_id: &str) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let packaging = self
            .selection
            .packagings
            .ready()
            .ok_or(ResolveError::NotResolved(Stage::Packagings))?
            .iter()
            .find(|p| p.id == packaging_id)
            .cloned()
            .ok_or_else(|| ResolveError::unknown("packaging", packaging_id))?;

        self.builder.set_field(DraftField::Packaging(packaging));
        self.settle()
    }

    /// The warehouse sits outside the dependent chain; changing it invalidates nothing.
    pub fn select_warehouse(&mut self, warehouse: Warehouse) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.selection.warehouse = Some(warehouse);
        self.settle()
    }

    /// Take a lookup result into the session, unless it belongs to a superseded selection.
    pub fn apply(&mut self, resolution: Resolution) -> Result<ApplyOutcome, SessionError> {
        let stage = resolution.ticket.stage();
        if !self.selection.accepts(&resolution.ticket) {
            tracing::warn!(
                session_id = %self.id,
                stage = ?stage,
                generation = resolution.ticket.generation,
                "Discarding stale lookup response"
            );
            return Ok(ApplyOutcome::Stale(stage));
        }
        if !self.status.is_editable() {
            // the answer is current but cannot land; fail the slot so the
            // caller re-selects once the session is editable again
            self.selection
                .fail(stage, format!("lookup arrived while session was {:?}", self.status));
            tracing::warn!(session_id = %self.id, stage = ?stage, status = ?self.status, "Lookup response refused");
            return Err(SessionError::Locked(self.status));
        }

        let fetched = match resolution.outcome {
            Ok(fetched) => fetched,
            Err(err) => {
                self.selection.fail(stage, err.to_string());
                return Err(ResolveError::Network(err).into());
            }
        };

        match fetched {
            Fetched::Customers(customers) => self.selection.customers.fulfil(customers),
            Fetched::PolicyBalances(policies) => {
                self.ledger.record_policies(&policies);
                if policies.iter().all(|p| !p.has_balance()) {
                    self.selection.policies.fail("no policy with remaining balance");
                    tracing::info!(session_id = %self.id, "Policy balances exhausted");
                    return Err(ResolveError::PolicyExhausted.into());
                }
                self.selection.policies.fulfil(policies);
            }
            Fetched::ReferencePolicies(references) => {
                self.ledger.record_reference_policies(&references);
                if references.is_empty() {
                    self.selection
                        .reference_policies
                        .fail("no reference policy allowed for this policy");
                    return Err(ResolveError::NoReferencePolicy.into());
                }
                self.selection.reference_policies.fulfil(references);
            }
            Fetched::Products(products) => self.selection.products.fulfil(products),
            Fetched::Packagings(packagings) => {
                self.selection.packagings.fulfil(packagings);
                self.derive_packaging_default();
            }
            Fetched::Pricing(quote) => {
                if let Err(err) = quote.validate() {
                    self.selection.pricing.fail(err.to_string());
                    return Err(ResolveError::InvalidQuote(err).into());
                }
                self.builder.draft_mut().apply_quote(&quote);
                self.selection.pricing.fulfil(quote);
                self.derive_packaging_default();
            }
        }

        tracing::debug!(session_id = %self.id, stage = ?stage, "Lookup applied");
        Ok(ApplyOutcome::Applied(stage))
    }

    // ------------------------------------------------------------------
    // Draft and staged lines
    // ------------------------------------------------------------------

    pub fn set_field(&mut self, name: &str, value: &Value) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.builder.set_field_by_name(name, value)?;
        self.settle()
    }

    pub fn stage(&mut self) -> Result<LineId, SessionError> {
        self.ensure_editable()?;
        let line_id = self.builder.stage(&self.ledger)?;
        // the draft is back to its empty sentinel, so its option lists go too
        self.selection.reset_from(Stage::ReferencePolicies);
        self.settle()?;
        Ok(line_id)
    }

    pub fn remove_line(&mut self, line_id: LineId) -> Result<OrderLine, SessionError> {
        self.ensure_editable()?;
        let line = self.builder.remove(line_id)?;
        self.settle()?;
        Ok(line)
    }

    // ------------------------------------------------------------------
    // Commit lifecycle
    // ------------------------------------------------------------------

    /// Validate everything locally and enter `Committing`. No network call is
    /// made here; a rejection leaves the session exactly as it was.
    pub fn begin_commit(
        &mut self,
        identity: &ComposerIdentity,
        status_marker: &str,
    ) -> Result<CommitPlan, CommitError> {
        if self.commit_in_flight || self.status == ComposeStatus::Committing {
            return Err(CommitError::AlreadyInFlight);
        }
        if self.status == ComposeStatus::Committed {
            return Err(CommitError::InvalidState(self.status));
        }

        let territory_id = self
            .selection
            .territory_id
            .clone()
            .ok_or(CommitError::MissingContext("territory"))?;
        let customer = self
            .selection
            .customer
            .clone()
            .ok_or(CommitError::MissingContext("customer"))?;
        let delivery_address = self
            .selection
            .delivery_address
            .clone()
            .ok_or(CommitError::MissingContext("delivery_address"))?;
        let policy_type = self
            .selection
            .policy_type
            .ok_or(CommitError::MissingContext("policy_type"))?;
        let warehouse = self
            .selection
            .warehouse
            .clone()
            .ok_or(CommitError::MissingContext("warehouse"))?;

        let lines = self.builder.commit_lines(&self.ledger)?;
        if lines.is_empty() {
            return Err(CommitError::NothingToCommit);
        }
        self.ledger.validate_all(&lines)?;
        let amount_total = lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.total))
            .ok_or_else(|| BuilderError::InvalidValue {
                field: "amount_total".to_string(),
                value: "out of range".to_string(),
            })?;

        self.transition(ComposeStatus::Committing)
            .map_err(|_| CommitError::InvalidState(self.status))?;
        self.commit_in_flight = true;
        self.last_commit_error = None;

        let erp = ErpOrderRequest {
            customer_id: customer.id.clone(),
            territory_id,
            delivery_address: delivery_address.label,
            policy_type,
            warehouse_id: warehouse.id,
            employee_id: identity.employee_id.clone(),
            company_id: identity.company_id.clone(),
            lines: lines.iter().map(OrderLine::to_erp_line).collect(),
        };

        tracing::info!(
            session_id = %self.id,
            lines = lines.len(),
            amount_total = %amount_total,
            "Commit started"
        );

        Ok(CommitPlan {
            session_id: self.id,
            customer_name: customer.name,
            status_marker: status_marker.to_string(),
            erp,
            lines,
            amount_total,
        })
    }

    /// Record how a commit attempt ended. Success empties the staged
    /// collection and makes the session terminal; any failure keeps every
    /// staged line and returns the session to an editable state.
    pub fn finish_commit(
        &mut self,
        outcome: &Result<CommitReceipt, CommitError>,
    ) -> Result<(), SessionError> {
        self.commit_in_flight = false;
        match outcome {
            Ok(receipt) => {
                self.transition(ComposeStatus::Committed)?;
                self.builder.discard_all();
                self.order_reference = Some(receipt.reference.clone());
            }
            Err(err) => {
                self.transition(ComposeStatus::CommitFailed)?;
                self.last_commit_error = Some(err.to_string());
                let resumed = if self.builder.staged().is_empty() {
                    ComposeStatus::Building
                } else {
                    ComposeStatus::LineStaged
                };
                self.transition(resumed)?;
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let draft = self.builder.draft();
        SessionSnapshot {
            id: self.id,
            created_at: self.created_at,
            status: self.status,
            commit_in_flight: self.commit_in_flight,
            selection: self.selection.clone(),
            draft: draft.clone(),
            draft_total: draft.total(),
            draft_missing: draft.missing_fields(),
            staged: self.builder.staged().to_vec(),
            balances: self.ledger.snapshot(self.builder.staged()),
            last_commit_error: self.last_commit_error.clone(),
            order_reference: self.order_reference.clone(),
        }
    }

    // ------------------------------------------------------------------

    fn customer_id(&self) -> Result<String, ResolveError> {
        self.selection
            .customer
            .as_ref()
            .map(|c| c.id.clone())
            .ok_or(ResolveError::MissingUpstream("customer"))
    }

    /// Clears the delivery address and everything after it.
    fn clear_from_address(&mut self) {
        self.selection.delivery_address = None;
        self.selection.policy_type = None;
        self.selection.reset_from(Stage::PolicyBalances);
        self.builder.reset_draft();
        self.builder.draft_mut().set_requires_reference(false);
    }

    /// Pre-select the packaging matching the quoted base unit quantity.
    fn derive_packaging_default(&mut self) {
        if self.builder.draft().packaging.is_some() {
            return;
        }
        let (Some(quote), Some(packagings)) = (
            self.selection.pricing.ready(),
            self.selection.packagings.ready(),
        ) else {
            return;
        };
        if let Some(packaging) = packagings.iter().find(|p| p.unit_qty == quote.unit_qty) {
            self.builder.set_field(DraftField::Packaging(packaging.clone()));
        }
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(SessionError::Locked(self.status))
        }
    }

    /// Move to `Building` or `LineStaged` depending on what the session holds.
    fn settle(&mut self) -> Result<(), SessionError> {
        let next = if !self.builder.staged().is_empty() {
            ComposeStatus::LineStaged
        } else if self.selection.is_empty() && self.builder.draft().is_empty() {
            return Ok(());
        } else {
            ComposeStatus::Building
        };
        if next != self.status {
            self.transition(next)?;
        }
        Ok(())
    }

    fn transition(&mut self, next: ComposeStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(session_id = %self.id, from = ?self.status, to = ?next, "Session transition");
        self.status = next;
        Ok(())
    }
}

/// Read-only view of a session for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: ComposeStatus,
    pub commit_in_flight: bool,
    pub selection: Selection,
    pub draft: DraftLine,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub draft_total: Option<Decimal>,
    pub draft_missing: Vec<&'static str>,
    pub staged: Vec<OrderLine>,
    pub balances: Vec<BalanceSnapshot>,
    pub last_commit_error: Option<String>,
    pub order_reference: Option<OrderReference>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SessionError {
    #[error("Session is {0:?} and cannot be edited")]
    Locked(ComposeStatus),

    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ComposeStatus,
        to: ComposeStatus,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Builder(#[from] BuilderError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use crate::resolver::SelectionResolver;
    use crate::testing::{drafted_session, fill_draft, InMemoryLookup};
    use rust_decimal_macros::dec;
    use salesdesk_catalog::PolicyKey;
    use salesdesk_core::GatewayError;
    use serde_json::json;
    use std::sync::Arc;

    fn resolver() -> (Arc<InMemoryLookup>, SelectionResolver) {
        let lookup = Arc::new(InMemoryLookup::sample());
        (lookup.clone(), SelectionResolver::new(lookup))
    }

    async fn with_customer(
        resolver: &SelectionResolver,
        customer_id: &str,
        policy_type: PolicyType,
    ) -> Result<ComposeSession, SessionError> {
        let mut session = ComposeSession::new();
        let ticket = session.select_territory("T-1")?;
        resolver.run(&mut session, ticket).await?;
        session.select_customer(customer_id)?;
        let ticket = session.select_policy_type(policy_type)?;
        resolver.run(&mut session, ticket).await?;
        Ok(session)
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let (_, resolver) = resolver();
        let mut session = ComposeSession::new();
        let first = session.select_territory("T-1").unwrap();
        let second = session.select_territory("T-2").unwrap();

        let late = resolver.resolve(first).await;
        let fresh = resolver.resolve(second).await;

        assert_eq!(
            session.apply(fresh).unwrap(),
            ApplyOutcome::Applied(Stage::Customers)
        );
        assert_eq!(
            session.apply(late).unwrap(),
            ApplyOutcome::Stale(Stage::Customers)
        );
        let customers = session.selection().customers.ready().unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].id, "C-3");
    }

    #[tokio::test]
    async fn test_first_selection_moves_to_building() {
        let (_, resolver) = resolver();
        let mut session = ComposeSession::new();
        assert_eq!(session.status(), ComposeStatus::Empty);
        let ticket = session.select_territory("T-1").unwrap();
        assert_eq!(session.status(), ComposeStatus::Building);
        resolver.run(&mut session, ticket).await.unwrap();
        session.select_customer("C-1").unwrap();
        assert_eq!(
            session.selection().delivery_address.as_ref().map(|a| a.label.as_str()),
            Some("Main Street Depot")
        );
    }

    #[tokio::test]
    async fn test_address_required_when_customer_has_several() {
        let (_, resolver) = resolver();
        let mut session = ComposeSession::new();
        let ticket = session.select_territory("T-1").unwrap();
        resolver.run(&mut session, ticket).await.unwrap();
        session.select_customer("C-2").unwrap();

        assert_eq!(
            session.select_policy_type(PolicyType::Credit).unwrap_err(),
            SessionError::Resolve(ResolveError::MissingUpstream("delivery_address"))
        );
        session.select_delivery_address("South Barn").unwrap();
        assert!(session.select_policy_type(PolicyType::Credit).is_ok());
    }

    #[tokio::test]
    async fn test_exhausted_policies_block_the_chain() {
        let (_, resolver) = resolver();
        let err = with_customer(&resolver, "C-1", PolicyType::Advance)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Resolve(ResolveError::PolicyExhausted));
    }

    #[tokio::test]
    async fn test_secure_credit_without_reference_cannot_stage() {
        let (_, resolver) = resolver();
        let mut session = with_customer(&resolver, "C-1", PolicyType::SecureCredit)
            .await
            .unwrap();

        let ticket = session.select_policy("S-2").unwrap();
        let err = resolver.run(&mut session, ticket).await.unwrap_err();
        assert_eq!(err, SessionError::Resolve(ResolveError::NoReferencePolicy));
        assert!(session.selection().products.ready().is_none());

        assert_eq!(
            session.stage().unwrap_err(),
            SessionError::Builder(BuilderError::MissingField("reference_policy"))
        );
        assert!(session.staged().is_empty());
    }

    #[tokio::test]
    async fn test_secure_credit_draws_on_reference_balance() {
        let (_, resolver) = resolver();
        let mut session = with_customer(&resolver, "C-1", PolicyType::SecureCredit)
            .await
            .unwrap();

        // R-2 holds 300; a box of PR-1 is 27.00
        for count in [11, 1] {
            let ticket = session.select_policy("S-1").unwrap();
            resolver.run(&mut session, ticket).await.unwrap();
            let ticket = session.select_reference_policy("R-2").unwrap();
            resolver.run(&mut session, ticket).await.unwrap();
            let tickets = session.select_product("PR-1").unwrap();
            resolver.run_all(&mut session, tickets).await.unwrap();
            session.set_field("pack_count", &json!(count)).unwrap();
            if count == 11 {
                session.stage().unwrap();
            }
        }

        let err = session.stage().unwrap_err();
        assert_eq!(
            err,
            SessionError::Builder(BuilderError::Ledger(LedgerError::InsufficientBalance {
                key: PolicyKey::Reference("R-2".to_string()),
                headroom: dec!(3),
                requested: dec!(27),
            }))
        );
        assert_eq!(session.staged().len(), 1);
        assert_eq!(session.staged()[0].reference_policy_code.as_deref(), Some("REF-2"));
    }

    #[tokio::test]
    async fn test_staging_resets_draft_and_reports_balances() {
        let (_, resolver) = resolver();
        let mut session = drafted_session(&resolver, 2).await;
        assert_eq!(session.draft().total(), Some(dec!(54)));
        assert_eq!(session.draft().packaging.as_ref().map(|p| p.id.as_str()), Some("PK-1"));

        let line_id = session.stage().unwrap();
        assert_eq!(session.status(), ComposeStatus::LineStaged);
        assert!(session.draft().is_empty());
        assert!(session.selection().products.ready().is_none());

        let snapshot = session.snapshot();
        let p1 = snapshot
            .balances
            .iter()
            .find(|b| b.key == PolicyKey::Policy("P-1".to_string()))
            .unwrap();
        assert_eq!(p1.consumed, dec!(54));
        assert_eq!(p1.headroom, dec!(946));

        session.remove_line(line_id).unwrap();
        assert_eq!(session.status(), ComposeStatus::Building);
        assert!(session.staged().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_change_keeps_staged_labels() {
        let (_, resolver) = resolver();
        let mut session = drafted_session(&resolver, 2).await;
        session.stage().unwrap();
        fill_draft(&resolver, &mut session, "P-2", "PR-2", 1).await;

        let ticket = session.select_territory("T-2").unwrap();
        resolver.run(&mut session, ticket).await.unwrap();

        assert!(session.selection().customer.is_none());
        assert!(session.selection().policy_type.is_none());
        assert!(session.draft().is_empty());

        let line = &session.staged()[0];
        assert_eq!(line.product_name, "Widget");
        assert_eq!(line.packaging_name, "Box of 12");
        assert_eq!(line.policy_code, "CR-1");
    }

    #[tokio::test]
    async fn test_packaging_ratio_overrides_quote_unit() {
        let (_, resolver) = resolver();
        let mut session = drafted_session(&resolver, 2).await;
        session.select_packaging("PK-2").unwrap();
        assert_eq!(session.draft().unit_qty(), Some(1));
        // 2 × 1 × 2.50 × 0.9
        assert_eq!(session.draft().total(), Some(dec!(4.5)));
    }

    #[tokio::test]
    async fn test_derived_fields_are_read_only() {
        let (_, resolver) = resolver();
        let mut session = drafted_session(&resolver, 2).await;
        assert_eq!(
            session.set_field("unit_price", &json!(0.01)).unwrap_err(),
            SessionError::Builder(BuilderError::ReadOnlyField("unit_price".to_string()))
        );
        assert_eq!(session.draft().unit_price(), Some(dec!(2.50)));
    }

    #[tokio::test]
    async fn test_lookup_failure_marks_slot_failed() {
        let (lookup, resolver) = resolver();
        let mut session = ComposeSession::new();
        lookup.fail_with(Some(GatewayError::Unreachable {
            service: "local-api".to_string(),
            message: "connection refused".to_string(),
        }));

        let ticket = session.select_territory("T-1").unwrap();
        let err = resolver.run(&mut session, ticket).await.unwrap_err();
        assert!(matches!(err, SessionError::Resolve(ResolveError::Network(_))));
        assert!(matches!(
            session.selection().customers.state(),
            crate::selection::SlotState::Failed(_)
        ));

        // a manual retry goes through once the service is back
        lookup.fail_with(None);
        let ticket = session.select_territory("T-1").unwrap();
        resolver.run(&mut session, ticket).await.unwrap();
        assert!(session.selection().customers.ready().is_some());
    }

    #[tokio::test]
    async fn test_session_locked_while_committing() {
        let (_, resolver) = resolver();
        let mut session = drafted_session(&resolver, 2).await;
        session.stage().unwrap();
        let pending = session.select_policy("P-2").unwrap();

        let plan = session
            .begin_commit(&ComposerIdentity::new("E-7", "CO-1"), "submitted")
            .unwrap();
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.amount_total, dec!(54));
        assert_eq!(session.status(), ComposeStatus::Committing);
        assert_eq!(
            session.select_territory("T-2").unwrap_err(),
            SessionError::Locked(ComposeStatus::Committing)
        );

        let late = resolver.resolve(pending).await;
        assert_eq!(
            session.apply(late).unwrap_err(),
            SessionError::Locked(ComposeStatus::Committing)
        );
        assert!(matches!(
            session.selection().products.state(),
            crate::selection::SlotState::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_lookup_refused_during_commit_can_be_reissued() {
        let (_, resolver) = resolver();
        let mut session = drafted_session(&resolver, 2).await;
        session.stage().unwrap();
        let pending = session.select_policy("P-2").unwrap();

        let identity = ComposerIdentity::new("E-7", "CO-1");
        session.begin_commit(&identity, "submitted").unwrap();
        let late = resolver.resolve(pending).await;
        assert!(session.apply(late).is_err());

        let failed: Result<CommitReceipt, CommitError> = Err(CommitError::NothingToCommit);
        session.finish_commit(&failed).unwrap();
        assert_eq!(session.status(), ComposeStatus::LineStaged);
        assert!(!session.selection().products.is_pending());

        let ticket = session.select_policy("P-2").unwrap();
        assert_eq!(
            resolver.run(&mut session, ticket).await.unwrap(),
            ApplyOutcome::Applied(Stage::Products)
        );
        assert!(session.selection().products.ready().is_some());
        assert_eq!(session.staged().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_lookup_during_commit_is_still_stale() {
        let (_, resolver) = resolver();
        let mut session = drafted_session(&resolver, 2).await;
        session.stage().unwrap();
        let first = session.select_policy("P-2").unwrap();
        let second = session.select_policy("P-1").unwrap();
        resolver.run(&mut session, second).await.unwrap();

        session
            .begin_commit(&ComposerIdentity::new("E-7", "CO-1"), "submitted")
            .unwrap();
        let late = resolver.resolve(first).await;
        assert_eq!(session.apply(late).unwrap(), ApplyOutcome::Stale(Stage::Products));
        assert!(session.selection().products.ready().is_some());
    }
}
