use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use salesdesk_catalog::{line_total, Packaging, Policy, PolicyKey, PriceQuote, Product, ReferencePolicy};
use salesdesk_core::{ErpOrderLine, LocalOrderLine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-generated identifier of a staged line.
pub type LineId = Uuid;

/// Lifecycle of a composition session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComposeStatus {
    Empty,
    Building,
    LineStaged,
    Committing,
    Committed,
    CommitFailed,
}

impl ComposeStatus {
    /// Whether selections and lines may still change.
    pub fn is_editable(&self) -> bool {
        !matches!(self, ComposeStatus::Committing | ComposeStatus::Committed)
    }

    pub fn can_transition_to(&self, next: ComposeStatus) -> bool {
        use ComposeStatus::*;
        matches!(
            (self, next),
            (Empty, Building)
                | (Building, Building)
                | (Building, LineStaged)
                | (Building, Committing)
                | (LineStaged, LineStaged)
                | (LineStaged, Building)
                | (LineStaged, Committing)
                | (Committing, Committed)
                | (Committing, CommitFailed)
                | (CommitFailed, LineStaged)
                | (CommitFailed, Building)
        )
    }
}

/// A finalized, immutable order line. Display labels are captured when the
/// line is staged and never re-resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub id: LineId,
    pub policy_id: String,
    pub policy_code: String,
    pub reference_policy_id: Option<String>,
    pub reference_policy_code: Option<String>,
    pub product_id: String,
    pub product_name: String,
    pub packaging_id: String,
    pub packaging_name: String,
    pub pack_count: u32,
    pub unit_qty: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_pct: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub staged_at: DateTime<Utc>,
}

impl OrderLine {
    /// The balance this line draws down.
    pub fn policy_key(&self) -> PolicyKey {
        match &self.reference_policy_id {
            Some(id) => PolicyKey::Reference(id.clone()),
            None => PolicyKey::Policy(self.policy_id.clone()),
        }
    }

    pub fn to_erp_line(&self) -> ErpOrderLine {
        ErpOrderLine {
            policy_id: self.policy_id.clone(),
            reference_policy_id: self.reference_policy_id.clone(),
            product_id: self.product_id.clone(),
            packaging_id: self.packaging_id.clone(),
            pack_count: self.pack_count,
            unit_qty: self.unit_qty,
            unit_price: self.unit_price,
            discount: self.discount_pct,
            total: self.total,
        }
    }

    pub fn to_local_line(&self) -> LocalOrderLine {
        LocalOrderLine {
            line: self.to_erp_line(),
            policy_code: self.policy_code.clone(),
            reference_policy_code: self.reference_policy_code.clone(),
            product_name: self.product_name.clone(),
            packaging_name: self.packaging_name.clone(),
        }
    }
}

/// The one mutable line being edited.
///
/// Choice fields are filled by the selection chain. `unit_qty`, `unit_price`
/// and `discount_pct` only ever come from a [`PriceQuote`] or the selected
/// packaging and have no public setters. A `pack_count` of zero is the
/// "unselected" sentinel.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DraftLine {
    pub policy: Option<Policy>,
    pub reference_policy: Option<ReferencePolicy>,
    pub product: Option<Product>,
    pub packaging: Option<Packaging>,
    pub pack_count: u32,
    requires_reference: bool,
    unit_qty: Option<u32>,
    #[serde(with = "rust_decimal::serde::float_option")]
    unit_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    discount_pct: Option<Decimal>,
}

impl DraftLine {
    pub fn new(requires_reference: bool) -> Self {
        Self {
            requires_reference,
            ..Self::default()
        }
    }

    pub fn unit_qty(&self) -> Option<u32> {
        self.unit_qty
    }

    pub fn unit_price(&self) -> Option<Decimal> {
        self.unit_price
    }

    pub fn discount_pct(&self) -> Option<Decimal> {
        self.discount_pct
    }

    pub fn requires_reference(&self) -> bool {
        self.requires_reference
    }

    /// Derived total, available once every factor is known.
    pub fn total(&self) -> Option<Decimal> {
        if self.pack_count == 0 {
            return None;
        }
        line_total(
            self.pack_count,
            self.unit_qty?,
            self.unit_price?,
            self.discount_pct?,
        )
        .ok()
    }

    pub fn is_empty(&self) -> bool {
        self.policy.is_none()
            && self.reference_policy.is_none()
            && self.product.is_none()
            && self.packaging.is_none()
            && self.pack_count == 0
    }

    /// Required fields still at their unselected sentinel, in chain order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.policy.is_none() {
            missing.push("policy");
        }
        if self.requires_reference && self.reference_policy.is_none() {
            missing.push("reference_policy");
        }
        if self.product.is_none() {
            missing.push("product");
        }
        if self.packaging.is_none() {
            missing.push("packaging");
        }
        if self.pack_count == 0 {
            missing.push("pack_count");
        }
        if self.unit_price.is_none() || self.discount_pct.is_none() {
            missing.push("price_quote");
        }
        missing
    }

    pub(crate) fn set_requires_reference(&mut self, requires_reference: bool) {
        self.requires_reference = requires_reference;
    }

    pub(crate) fn apply_quote(&mut self, quote: &PriceQuote) {
        self.unit_price = Some(quote.unit_price);
        self.discount_pct = Some(quote.discount_pct);
        if self.packaging.is_none() {
            self.unit_qty = Some(quote.unit_qty);
        }
    }

    pub(crate) fn apply_packaging(&mut self, packaging: Packaging) {
        self.unit_qty = Some(packaging.unit_qty);
        self.packaging = Some(packaging);
    }

    pub(crate) fn clear_pricing(&mut self) {
        self.unit_qty = None;
        self.unit_price = None;
        self.discount_pct = None;
    }

    /// Builds the immutable line. Callers check [`Self::missing_fields`] first.
    pub(crate) fn finalize(&self, id: LineId) -> Option<OrderLine> {
        if !self.missing_fields().is_empty() {
            return None;
        }
        let policy = self.policy.as_ref()?;
        let product = self.product.as_ref()?;
        let packaging = self.packaging.as_ref()?;
        let reference = if self.requires_reference {
            Some(self.reference_policy.as_ref()?)
        } else {
            None
        };

        Some(OrderLine {
            id,
            policy_id: policy.id.clone(),
            policy_code: policy.code.clone(),
            reference_policy_id: reference.map(|r| r.id.clone()),
            reference_policy_code: reference.map(|r| r.code.clone()),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            packaging_id: packaging.id.clone(),
            packaging_name: packaging.name.clone(),
            pack_count: self.pack_count,
            unit_qty: self.unit_qty?,
            unit_price: self.unit_price?,
            discount_pct: self.discount_pct?,
            total: self.total()?,
            staged_at: Utc::now(),
        })
    }
}
