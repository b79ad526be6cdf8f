use rust_decimal::Decimal;
use salesdesk_catalog::{Policy, PolicyKey, ReferencePolicy};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::OrderLine;

/// Client-side projection of policy headroom.
///
/// Remaining amounts are whatever the server last reported; the ledger never
/// decrements them. Consumption is always recomputed from the staged lines
/// passed in, so removing a line frees its headroom without bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct PolicyLedger {
    remaining: HashMap<PolicyKey, Decimal>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BalanceSnapshot {
    pub key: PolicyKey,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub consumed: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub headroom: Decimal,
}

impl PolicyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record balances from a fresh policy fetch.
    pub fn record_policies(&mut self, policies: &[Policy]) {
        for policy in policies {
            self.remaining
                .insert(PolicyKey::Policy(policy.id.clone()), policy.remaining_amount);
        }
    }

    pub fn record_reference_policies(&mut self, policies: &[ReferencePolicy]) {
        for policy in policies {
            self.remaining
                .insert(PolicyKey::Reference(policy.id.clone()), policy.remaining_amount);
        }
    }

    pub fn remaining(&self, key: &PolicyKey) -> Option<Decimal> {
        self.remaining.get(key).copied()
    }

    pub fn consumed(&self, key: &PolicyKey, staged: &[OrderLine]) -> Result<Decimal, LedgerError> {
        staged_total(key, staged).ok_or_else(|| LedgerError::Overflow(key.clone()))
    }

    /// Spendable amount left on `key`. Unknown keys have no headroom.
    pub fn headroom(&self, key: &PolicyKey, staged: &[OrderLine]) -> Result<Decimal, LedgerError> {
        self.remaining(key)
            .unwrap_or(Decimal::ZERO)
            .checked_sub(self.consumed(key, staged)?)
            .ok_or_else(|| LedgerError::Overflow(key.clone()))
    }

    /// All-or-nothing check of one candidate amount against `key`.
    pub fn validate(
        &self,
        key: &PolicyKey,
        amount: Decimal,
        staged: &[OrderLine],
    ) -> Result<(), LedgerError> {
        let remaining = self
            .remaining(key)
            .ok_or_else(|| LedgerError::UnknownBalance(key.clone()))?;
        let consumed = self.consumed(key, staged)?;
        let after = amount
            .checked_add(consumed)
            .ok_or_else(|| LedgerError::Overflow(key.clone()))?;

        if after > remaining {
            return Err(LedgerError::InsufficientBalance {
                key: key.clone(),
                headroom: remaining.saturating_sub(consumed),
                requested: amount,
            });
        }
        Ok(())
    }

    pub fn validate_line(&self, line: &OrderLine, staged: &[OrderLine]) -> Result<(), LedgerError> {
        self.validate(&line.policy_key(), line.total, staged)
    }

    /// Re-checks a whole line list, e.g. after balances were refetched lower
    /// than what is already staged.
    pub fn validate_all(&self, lines: &[OrderLine]) -> Result<(), LedgerError> {
        let mut keys: Vec<PolicyKey> = Vec::new();
        for line in lines {
            let key = line.policy_key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        for key in keys {
            let remaining = self
                .remaining(&key)
                .ok_or_else(|| LedgerError::UnknownBalance(key.clone()))?;
            let consumed = self.consumed(&key, lines)?;
            if consumed > remaining {
                return Err(LedgerError::InsufficientBalance {
                    headroom: remaining,
                    requested: consumed,
                    key,
                });
            }
        }
        Ok(())
    }

    /// Balance view for every key known to the ledger or referenced by a staged line.
    pub fn snapshot(&self, staged: &[OrderLine]) -> Vec<BalanceSnapshot> {
        let mut keys: Vec<PolicyKey> = self.remaining.keys().cloned().collect();
        for line in staged {
            let key = line.policy_key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys.sort_by_key(|k| k.to_string());

        keys.into_iter()
            .map(|key| {
                let remaining = self.remaining(&key).unwrap_or(Decimal::ZERO);
                // display only; an overflowing sum is shown as the ceiling
                let consumed = staged_total(&key, staged).unwrap_or(Decimal::MAX);
                BalanceSnapshot {
                    headroom: remaining.saturating_sub(consumed),
                    key,
                    remaining,
                    consumed,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient balance on {key}: headroom {headroom}, requested {requested}")]
    InsufficientBalance {
        key: PolicyKey,
        headroom: Decimal,
        requested: Decimal,
    },

    #[error("No balance known for {0}")]
    UnknownBalance(PolicyKey),

    #[error("Amount on {0} is out of range")]
    Overflow(PolicyKey),
}

fn staged_total(key: &PolicyKey, staged: &[OrderLine]) -> Option<Decimal> {
    staged
        .iter()
        .filter(|line| &line.policy_key() == key)
        .try_fold(Decimal::ZERO, |acc, line| acc.checked_add(line.total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(policy_id: &str, reference: Option<&str>, total: Decimal) -> OrderLine {
        OrderLine {
            id: Uuid::new_v4(),
            policy_id: policy_id.to_string(),
            policy_code: format!("{}-code", policy_id),
            reference_policy_id: reference.map(str::to_string),
            reference_policy_code: None,
            product_id: "PR-1".to_string(),
            product_name: "Urea".to_string(),
            packaging_id: "PK-1".to_string(),
            packaging_name: "Bag".to_string(),
            pack_count: 1,
            unit_qty: 1,
            unit_price: total,
            discount_pct: Decimal::ZERO,
            total,
            staged_at: Utc::now(),
        }
    }

    fn ledger_with(policy_id: &str, remaining: Decimal) -> PolicyLedger {
        let mut ledger = PolicyLedger::new();
        ledger.record_policies(&[Policy {
            id: policy_id.to_string(),
            code: "ADV".to_string(),
            remaining_amount: remaining,
        }]);
        ledger
    }

    #[test]
    fn test_rejects_overdraw_and_reports_headroom() {
        let ledger = ledger_with("P-1", dec!(1000));
        let staged = vec![line("P-1", None, dec!(400))];
        let key = PolicyKey::Policy("P-1".to_string());

        let err = ledger.validate(&key, dec!(700), &staged).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance { key: key.clone(), headroom: dec!(600), requested: dec!(700) }
        );

        assert!(ledger.validate(&key, dec!(500), &staged).is_ok());
        assert!(ledger.validate(&key, dec!(600), &staged).is_ok());
    }

    #[test]
    fn test_reference_policy_keys_are_separate() {
        let mut ledger = ledger_with("P-1", dec!(100));
        ledger.record_reference_policies(&[ReferencePolicy {
            id: "P-1".to_string(),
            code: "SEC".to_string(),
            remaining_amount: dec!(50),
        }]);

        let staged = vec![line("P-1", Some("P-1"), dec!(40))];
        assert_eq!(ledger.headroom(&PolicyKey::Reference("P-1".to_string()), &staged), Ok(dec!(10)));
        assert_eq!(ledger.headroom(&PolicyKey::Policy("P-1".to_string()), &staged), Ok(dec!(100)));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let ledger = PolicyLedger::new();
        let key = PolicyKey::Policy("ghost".to_string());
        assert_eq!(ledger.validate(&key, dec!(1), &[]), Err(LedgerError::UnknownBalance(key)));
    }

    #[test]
    fn test_validate_all_catches_lowered_balance() {
        let mut ledger = ledger_with("P-1", dec!(1000));
        let staged = vec![line("P-1", None, dec!(400)), line("P-1", None, dec!(500))];
        assert!(ledger.validate_all(&staged).is_ok());

        // a refetch reports less than what is already staged
        ledger.record_policies(&[Policy { id: "P-1".to_string(), code: "ADV".to_string(), remaining_amount: dec!(800) }]);
        assert!(matches!(
            ledger.validate_all(&staged),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_snapshot_lists_consumption() {
        let ledger = ledger_with("P-1", dec!(1000));
        let staged = vec![line("P-1", None, dec!(250))];
        let snapshot = ledger.snapshot(&staged);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].consumed, dec!(250));
        assert_eq!(snapshot[0].headroom, dec!(750));
    }

    #[test]
    fn test_huge_amounts_are_rejected_without_panicking() {
        let ledger = ledger_with("P-1", Decimal::MAX);
        let key = PolicyKey::Policy("P-1".to_string());
        let staged = vec![line("P-1", None, Decimal::MAX)];

        assert_eq!(
            ledger.validate(&key, Decimal::MAX, &staged),
            Err(LedgerError::Overflow(key.clone()))
        );

        let doubled = vec![line("P-1", None, Decimal::MAX), line("P-1", None, Decimal::MAX)];
        assert_eq!(ledger.validate_all(&doubled), Err(LedgerError::Overflow(key.clone())));
        assert_eq!(ledger.headroom(&key, &doubled), Err(LedgerError::Overflow(key)));

        let snapshot = ledger.snapshot(&doubled);
        assert_eq!(snapshot[0].consumed, Decimal::MAX);
        assert_eq!(snapshot[0].headroom, Decimal::ZERO);
    }
}
