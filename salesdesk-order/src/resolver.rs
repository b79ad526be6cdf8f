use salesdesk_catalog::PricingError;
use salesdesk_core::{GatewayError, LookupGateway};
use std::sync::Arc;

use crate::selection::{FetchRequest, FetchTicket, Fetched, Resolution, Stage};
use crate::session::{ApplyOutcome, ComposeSession, SessionError};

/// Runs the lookups the selection chain asks for.
///
/// The resolver holds no selection state of its own: it takes a ticket issued
/// by a [`ComposeSession`], performs the remote reads, and hands back a
/// [`Resolution`] carrying the same ticket. Whether the answer is still wanted
/// is decided when the session applies it.
#[derive(Clone)]
pub struct SelectionResolver {
    gateway: Arc<dyn LookupGateway>,
}

impl SelectionResolver {
    pub fn new(gateway: Arc<dyn LookupGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn LookupGateway> {
        &self.gateway
    }

    pub async fn resolve(&self, ticket: FetchTicket) -> Resolution {
        let outcome = self.fetch(&ticket.request).await;
        if let Err(err) = &outcome {
            tracing::warn!(stage = ?ticket.stage(), error = %err, "Lookup failed");
        }
        Resolution { ticket, outcome }
    }

    /// Resolve and apply in one step, for callers that own the session
    /// exclusively across the await.
    pub async fn run(
        &self,
        session: &mut ComposeSession,
        ticket: FetchTicket,
    ) -> Result<ApplyOutcome, SessionError> {
        let resolution = self.resolve(ticket).await;
        session.apply(resolution)
    }

    /// Run several tickets one after another, stopping at the first error.
    pub async fn run_all(
        &self,
        session: &mut ComposeSession,
        tickets: Vec<FetchTicket>,
    ) -> Result<Vec<ApplyOutcome>, SessionError> {
        let mut outcomes = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            outcomes.push(self.run(session, ticket).await?);
        }
        Ok(outcomes)
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Fetched, GatewayError> {
        match request {
            FetchRequest::Customers { territory_id } => self
                .gateway
                .customers(territory_id)
                .await
                .map(Fetched::Customers),
            FetchRequest::PolicyBalances {
                customer_id,
                policy_type,
            } => self
                .gateway
                .policies(customer_id, *policy_type)
                .await
                .map(Fetched::PolicyBalances),
            FetchRequest::ReferencePolicies {
                customer_id,
                policy_id,
            } => {
                let candidates = self.gateway.reference_policies(customer_id).await?;
                if candidates.is_empty() {
                    return Ok(Fetched::ReferencePolicies(candidates));
                }
                let codes: Vec<String> = candidates.iter().map(|r| r.code.clone()).collect();
                let allowed = self
                    .gateway
                    .allowed_reference_codes(policy_id, &codes)
                    .await?;
                let permitted = candidates
                    .into_iter()
                    .filter(|r| allowed.iter().any(|code| code == &r.code))
                    .collect();
                Ok(Fetched::ReferencePolicies(permitted))
            }
            FetchRequest::Products {
                policy_id,
                reference_policy_id,
            } => self
                .gateway
                .products(policy_id, reference_policy_id.as_deref())
                .await
                .map(Fetched::Products),
            FetchRequest::Packagings { product_id } => self
                .gateway
                .packagings(product_id)
                .await
                .map(Fetched::Packagings),
            FetchRequest::Pricing {
                customer_id,
                policy_id,
                product_id,
            } => self
                .gateway
                .price_quote(customer_id, policy_id, product_id)
                .await
                .map(Fetched::Pricing),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ResolveError {
    #[error("Select {0} first")]
    MissingUpstream(&'static str),

    #[error("Options for {0:?} are not resolved yet")]
    NotResolved(Stage),

    #[error("Unknown {field}: {id}")]
    UnknownOption { field: &'static str, id: String },

    #[error("No policy with remaining balance")]
    PolicyExhausted,

    #[error("No reference policy is allowed for the selected policy")]
    NoReferencePolicy,

    #[error("Reference policies only apply to secure-credit purchases")]
    NotSecureCredit,

    #[error("Invalid price quote: {0}")]
    InvalidQuote(#[from] PricingError),

    #[error("Lookup failed: {0}")]
    Network(#[from] GatewayError),
}

impl ResolveError {
    pub(crate) fn unknown(field: &'static str, id: &str) -> Self {
        Self::UnknownOption {
            field,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryLookup;
    use salesdesk_catalog::PolicyType;

    fn ticket(request: FetchRequest) -> FetchTicket {
        FetchTicket {
            generation: 1,
            request,
        }
    }

    #[tokio::test]
    async fn test_reference_policies_filtered_by_allowed_codes() {
        let lookup = Arc::new(InMemoryLookup::sample());
        lookup.update(|data| {
            data.allowed_codes
                .insert("S-1".to_string(), vec!["REF-2".to_string()]);
        });
        let resolver = SelectionResolver::new(lookup.clone());

        let resolution = resolver
            .resolve(ticket(FetchRequest::ReferencePolicies {
                customer_id: "C-1".to_string(),
                policy_id: "S-1".to_string(),
            }))
            .await;

        match resolution.outcome {
            Ok(Fetched::ReferencePolicies(refs)) => {
                assert_eq!(refs.len(), 1);
                assert_eq!(refs[0].id, "R-2");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            lookup.calls(),
            vec!["reference_policies:C-1", "allowed_reference_codes:S-1"]
        );
    }

    #[tokio::test]
    async fn test_no_candidates_skips_cross_reference() {
        let lookup = Arc::new(InMemoryLookup::sample());
        lookup.update(|data| data.reference_policies.clear());
        let resolver = SelectionResolver::new(lookup.clone());

        let resolution = resolver
            .resolve(ticket(FetchRequest::ReferencePolicies {
                customer_id: "C-1".to_string(),
                policy_id: "S-1".to_string(),
            }))
            .await;

        assert!(matches!(
            resolution.outcome,
            Ok(Fetched::ReferencePolicies(ref refs)) if refs.is_empty()
        ));
        assert_eq!(lookup.calls(), vec!["reference_policies:C-1"]);
    }

    #[tokio::test]
    async fn test_resolution_keeps_ticket_on_failure() {
        let lookup = Arc::new(InMemoryLookup::sample());
        lookup.fail_with(Some(GatewayError::Timeout {
            service: "local-api".to_string(),
        }));
        let resolver = SelectionResolver::new(lookup);

        let issued = ticket(FetchRequest::PolicyBalances {
            customer_id: "C-1".to_string(),
            policy_type: PolicyType::Credit,
        });
        let resolution = resolver.resolve(issued.clone()).await;
        assert_eq!(resolution.ticket, issued);
        assert!(matches!(
            resolution.outcome,
            Err(GatewayError::Timeout { .. })
        ));
    }
}
