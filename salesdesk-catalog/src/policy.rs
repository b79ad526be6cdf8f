use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Purchasing arrangement a customer buys under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Advance,
    Credit,
    SecureCredit,
}

impl PolicyType {
    /// Secure-credit purchases are funded by a reference policy; the primary
    /// policy only decides discount eligibility.
    pub fn requires_reference_policy(&self) -> bool {
        matches!(self, PolicyType::SecureCredit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Advance => "advance",
            PolicyType::Credit => "credit",
            PolicyType::SecureCredit => "secure_credit",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "advance" => Ok(PolicyType::Advance),
            "credit" => Ok(PolicyType::Credit),
            "secure_credit" => Ok(PolicyType::SecureCredit),
            other => Err(format!("unknown policy type: {}", other)),
        }
    }
}

/// A balance the customer may spend against. `remaining_amount` is whatever the
/// server last reported and is never adjusted locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub id: String,
    pub code: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_amount: Decimal,
}

impl Policy {
    pub fn has_balance(&self) -> bool {
        self.remaining_amount > Decimal::ZERO
    }
}

/// Second balance pool used under [`PolicyType::SecureCredit`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferencePolicy {
    pub id: String,
    pub code: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_amount: Decimal,
}

/// The balance a line draws down: the policy itself, or its reference policy
/// when buying on secure credit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PolicyKey {
    Policy(String),
    Reference(String),
}

impl PolicyKey {
    pub fn id(&self) -> &str {
        match self {
            PolicyKey::Policy(id) | PolicyKey::Reference(id) => id,
        }
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKey::Policy(id) => write!(f, "policy:{}", id),
            PolicyKey::Reference(id) => write!(f, "reference:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_type_parsing() {
        assert_eq!("secure-credit".parse::<PolicyType>().unwrap(), PolicyType::SecureCredit);
        assert_eq!("Advance".parse::<PolicyType>().unwrap(), PolicyType::Advance);
        assert!("barter".parse::<PolicyType>().is_err());
        assert!(PolicyType::SecureCredit.requires_reference_policy());
        assert!(!PolicyType::Credit.requires_reference_policy());
    }

    #[test]
    fn test_policy_key_wire_shape() {
        let key = PolicyKey::Reference("RP-9".to_string());
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "reference", "id": "RP-9"}));
        assert_eq!(key.to_string(), "reference:RP-9");
    }
}
