use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Authoritative pricing for a (customer, policy, product) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    /// Percentage, e.g. `12.5` for 12.5 %.
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_pct: Decimal,
    /// Base units per pack the server prices against.
    pub unit_qty: u32,
}

impl PriceQuote {
    pub fn validate(&self) -> Result<(), PricingError> {
        if self.unit_price < Decimal::ZERO {
            return Err(PricingError::NegativePrice(self.unit_price));
        }
        discount_fraction(self.discount_pct)?;
        Ok(())
    }
}

/// Converts a percentage into the fraction it removes from the price.
pub fn discount_fraction(discount_pct: Decimal) -> Result<Decimal, PricingError> {
    if discount_pct < Decimal::ZERO || discount_pct > Decimal::ONE_HUNDRED {
        return Err(PricingError::DiscountOutOfRange(discount_pct));
    }
    Ok(discount_pct / Decimal::ONE_HUNDRED)
}

/// `pack_count × unit_qty × unit_price × (1 − discount_pct/100)`, unrounded.
pub fn line_total(
    pack_count: u32,
    unit_qty: u32,
    unit_price: Decimal,
    discount_pct: Decimal,
) -> Result<Decimal, PricingError> {
    let fraction = discount_fraction(discount_pct)?;
    let units = Decimal::from(pack_count)
        .checked_mul(Decimal::from(unit_qty))
        .ok_or(PricingError::Overflow)?;
    units
        .checked_mul(unit_price)
        .and_then(|gross| gross.checked_mul(Decimal::ONE - fraction))
        .ok_or(PricingError::Overflow)
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("Discount must be between 0 and 100 percent, got {0}")]
    DiscountOutOfRange(Decimal),

    #[error("Unit price cannot be negative: {0}")]
    NegativePrice(Decimal),

    #[error("Line total overflows decimal range")]
    Overflow,
}
