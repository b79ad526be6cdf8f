use salesdesk_catalog::{Packaging, Policy, Product, ReferencePolicy};
use serde_json::Value;
use uuid::Uuid;

use crate::ledger::{LedgerError, PolicyLedger};
use crate::models::{DraftLine, LineId, OrderLine};

/// Fields the selection chain owns. They change through the resolver so the
/// option lists downstream stay consistent.
const SELECTION_FIELDS: &[&str] = &["policy", "reference_policy", "product", "packaging"];

/// Server-derived fields, never writable from user input.
const READ_ONLY_FIELDS: &[&str] = &["unit_qty", "unit_price", "discount_pct", "total"];

/// A typed change to the draft.
#[derive(Debug, Clone)]
pub enum DraftField {
    Policy(Policy),
    ReferencePolicy(ReferencePolicy),
    Product(Product),
    Packaging(Packaging),
    PackCount(u32),
}

/// Holds the draft line and the staged collection.
#[derive(Debug, Clone, Default)]
pub struct LineItemBuilder {
    draft: DraftLine,
    staged: Vec<OrderLine>,
}

impl LineItemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &DraftLine {
        &self.draft
    }

    pub fn staged(&self) -> &[OrderLine] {
        &self.staged
    }

    pub(crate) fn draft_mut(&mut self) -> &mut DraftLine {
        &mut self.draft
    }

    /// Apply a typed field change. Choosing a field clears every field that
    /// depends on it.
    pub fn set_field(&mut self, field: DraftField) {
        match field {
            DraftField::Policy(policy) => {
                self.draft.reference_policy = None;
                self.clear_product();
                self.draft.policy = Some(policy);
            }
            DraftField::ReferencePolicy(reference) => {
                self.clear_product();
                self.draft.reference_policy = Some(reference);
            }
            DraftField::Product(product) => {
                self.clear_product();
                self.draft.product = Some(product);
            }
            DraftField::Packaging(packaging) => {
                self.draft.apply_packaging(packaging);
            }
            DraftField::PackCount(count) => {
                self.draft.pack_count = count;
            }
        }
    }

    /// Apply a user edit addressed by field name.
    pub fn set_field_by_name(&mut self, name: &str, value: &Value) -> Result<(), BuilderError> {
        if READ_ONLY_FIELDS.contains(&name) {
            return Err(BuilderError::ReadOnlyField(name.to_string()));
        }
        if SELECTION_FIELDS.contains(&name) {
            return Err(BuilderError::SelectionField(name.to_string()));
        }

        match name {
            "pack_count" => {
                let count = value
                    .as_u64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| BuilderError::InvalidValue {
                        field: name.to_string(),
                        value: value.to_string(),
                    })?;
                self.set_field(DraftField::PackCount(count));
                Ok(())
            }
            other => Err(BuilderError::UnknownField(other.to_string())),
        }
    }

    /// Validate the draft against the ledger and promote it.
    ///
    /// On any rejection neither the draft nor the staged collection changes.
    pub fn stage(&mut self, ledger: &PolicyLedger) -> Result<LineId, BuilderError> {
        let line = self.finalized_draft()?;
        ledger.validate_line(&line, &self.staged)?;

        let id = line.id;
        tracing::debug!(line_id = %id, key = %line.policy_key(), total = %line.total, "Line staged");
        self.staged.push(line);
        self.reset_draft();
        Ok(id)
    }

    pub fn remove(&mut self, line_id: LineId) -> Result<OrderLine, BuilderError> {
        let index = self
            .staged
            .iter()
            .position(|line| line.id == line_id)
            .ok_or(BuilderError::LineNotFound(line_id))?;
        Ok(self.staged.remove(index))
    }

    /// Drop every staged line. Only called after both commit phases succeeded.
    pub fn discard_all(&mut self) {
        self.staged.clear();
        self.reset_draft();
    }

    pub fn reset_draft(&mut self) {
        let requires_reference = self.draft.requires_reference();
        self.draft = DraftLine::new(requires_reference);
    }

    /// Staged lines followed by the draft, if the draft is complete.
    ///
    /// An incomplete draft is left out. A complete one must still fit the
    /// ledger on top of what is staged.
    pub fn commit_lines(&self, ledger: &PolicyLedger) -> Result<Vec<OrderLine>, BuilderError> {
        let mut lines = self.staged.clone();
        if self.draft.missing_fields().is_empty() {
            let line = self.finalized_draft()?;
            ledger.validate_line(&line, &self.staged)?;
            lines.push(line);
        }
        Ok(lines)
    }

    fn finalized_draft(&self) -> Result<OrderLine, BuilderError> {
        if let Some(field) = self.draft.missing_fields().first().copied() {
            return Err(BuilderError::MissingField(field));
        }
        self.draft
            .finalize(Uuid::new_v4())
            .ok_or(BuilderError::MissingField("total"))
    }

    fn clear_product(&mut self) {
        self.draft.product = None;
        self.draft.packaging = None;
        self.draft.clear_pricing();
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum BuilderError {
    #[error("Required field not selected: {0}")]
    MissingField(&'static str),

    #[error("Field is derived from pricing and cannot be edited: {0}")]
    ReadOnlyField(String),

    #[error("Field is chosen through the selection chain: {0}")]
    SelectionField(String),

    #[error("Unknown draft field: {0}")]
    UnknownField(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Staged line not found: {0}")]
    LineNotFound(LineId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
