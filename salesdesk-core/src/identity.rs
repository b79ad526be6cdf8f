use salesdesk_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is composing the order. Stamped on both commit payloads.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposerIdentity {
    pub employee_id: String,
    pub company_id: String,
}

impl ComposerIdentity {
    pub fn new(employee_id: impl Into<String>, company_id: impl Into<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            company_id: company_id.into(),
        }
    }
}

impl fmt::Debug for ComposerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposerIdentity")
            .field("employee_id", &Masked::new(&self.employee_id))
            .field("company_id", &self.company_id)
            .finish()
    }
}
