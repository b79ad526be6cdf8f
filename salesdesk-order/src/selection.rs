use salesdesk_catalog::{
    Customer, DeliveryAddress, Packaging, Policy, PolicyType, PriceQuote, Product,
    ReferencePolicy, Warehouse,
};
use salesdesk_core::GatewayError;
use serde::Serialize;

/// Dependent lookups, in chain order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Customers,
    PolicyBalances,
    ReferencePolicies,
    Products,
    Packagings,
    Pricing,
}

/// A fetched option set guarded by a generation counter. Every reset or new
/// fetch bumps the generation, so a response tagged with an older one is
/// recognisably stale.
#[derive(Debug, Clone, Serialize)]
pub struct Slot<T> {
    generation: u64,
    #[serde(flatten)]
    state: SlotState<T>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum SlotState<T> {
    Unresolved,
    Pending,
    Ready(T),
    Failed(String),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            state: SlotState::Unresolved,
        }
    }
}

impl<T> Slot<T> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &SlotState<T> {
        &self.state
    }

    pub fn ready(&self) -> Option<&T> {
        match &self.state {
            SlotState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SlotState::Pending)
    }

    pub(crate) fn reset(&mut self) {
        self.generation += 1;
        self.state = SlotState::Unresolved;
    }

    pub(crate) fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.state = SlotState::Pending;
        self.generation
    }

    pub(crate) fn accepts(&self, generation: u64) -> bool {
        self.generation == generation && self.is_pending()
    }

    pub(crate) fn fulfil(&mut self, value: T) {
        self.state = SlotState::Ready(value);
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.state = SlotState::Failed(reason.into());
    }
}

/// Parameters of one dependent lookup, captured when it was issued.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Customers {
        territory_id: String,
    },
    PolicyBalances {
        customer_id: String,
        policy_type: PolicyType,
    },
    ReferencePolicies {
        customer_id: String,
        policy_id: String,
    },
    Products {
        policy_id: String,
        reference_policy_id: Option<String>,
    },
    Packagings {
        product_id: String,
    },
    Pricing {
        customer_id: String,
        policy_id: String,
        product_id: String,
    },
}

impl FetchRequest {
    pub fn stage(&self) -> Stage {
        match self {
            FetchRequest::Customers { .. } => Stage::Customers,
            FetchRequest::PolicyBalances { .. } => Stage::PolicyBalances,
            FetchRequest::ReferencePolicies { .. } => Stage::ReferencePolicies,
            FetchRequest::Products { .. } => Stage::Products,
            FetchRequest::Packagings { .. } => Stage::Packagings,
            FetchRequest::Pricing { .. } => Stage::Pricing,
        }
    }
}

/// A lookup the caller must run, tagged with the slot generation it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub request: FetchRequest,
}

impl FetchTicket {
    pub fn stage(&self) -> Stage {
        self.request.stage()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Customers(Vec<Customer>),
    PolicyBalances(Vec<Policy>),
    /// Already narrowed to the server-approved subset.
    ReferencePolicies(Vec<ReferencePolicy>),
    Products(Vec<Product>),
    Packagings(Vec<Packaging>),
    Pricing(PriceQuote),
}

/// Result of running a [`FetchTicket`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub ticket: FetchTicket,
    pub outcome: Result<Fetched, GatewayError>,
}

/// Order-level context plus every option set of the dependent chain.
/// Line-level choices (policy, product, packaging) live on the draft line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Selection {
    pub territory_id: Option<String>,
    pub customer: Option<Customer>,
    pub delivery_address: Option<DeliveryAddress>,
    pub policy_type: Option<PolicyType>,
    pub warehouse: Option<Warehouse>,
    pub customers: Slot<Vec<Customer>>,
    pub policies: Slot<Vec<Policy>>,
    pub reference_policies: Slot<Vec<ReferencePolicy>>,
    pub products: Slot<Vec<Product>>,
    pub packagings: Slot<Vec<Packaging>>,
    pub pricing: Slot<PriceQuote>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.territory_id.is_none() && self.warehouse.is_none()
    }

    /// Resets every slot at or after `stage`.
    pub(crate) fn reset_from(&mut self, stage: Stage) {
        if stage <= Stage::Customers {
            self.customers.reset();
        }
        if stage <= Stage::PolicyBalances {
            self.policies.reset();
        }
        if stage <= Stage::ReferencePolicies {
            self.reference_policies.reset();
        }
        if stage <= Stage::Products {
            self.products.reset();
        }
        if stage <= Stage::Packagings {
            self.packagings.reset();
        }
        self.pricing.reset();
    }

    pub(crate) fn begin(&mut self, request: FetchRequest) -> FetchTicket {
        let generation = match request.stage() {
            Stage::Customers => self.customers.begin(),
            Stage::PolicyBalances => self.policies.begin(),
            Stage::ReferencePolicies => self.reference_policies.begin(),
            Stage::Products => self.products.begin(),
            Stage::Packagings => self.packagings.begin(),
            Stage::Pricing => self.pricing.begin(),
        };
        FetchTicket { generation, request }
    }

    pub(crate) fn accepts(&self, ticket: &FetchTicket) -> bool {
        match ticket.stage() {
            Stage::Customers => self.customers.accepts(ticket.generation),
            Stage::PolicyBalances => self.policies.accepts(ticket.generation),
            Stage::ReferencePolicies => self.reference_policies.accepts(ticket.generation),
            Stage::Products => self.products.accepts(ticket.generation),
            Stage::Packagings => self.packagings.accepts(ticket.generation),
            Stage::Pricing => self.pricing.accepts(ticket.generation),
        }
    }

    pub(crate) fn fail(&mut self, stage: Stage, reason: impl Into<String>) {
        match stage {
            Stage::Customers => self.customers.fail(reason),
            Stage::PolicyBalances => self.policies.fail(reason),
            Stage::ReferencePolicies => self.reference_policies.fail(reason),
            Stage::Products => self.products.fail(reason),
            Stage::Packagings => self.packagings.fail(reason),
            Stage::Pricing => self.pricing.fail(reason),
        }
    }
}
