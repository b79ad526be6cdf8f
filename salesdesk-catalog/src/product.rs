use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A sellable catalog item. `list_price` is informational only; the price a
/// line is charged always comes from a [`crate::PriceQuote`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub list_price: Decimal,
}

/// How a product is packed: one pack holds `unit_qty` base units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packaging {
    pub id: String,
    pub name: String,
    pub product_id: String,
    pub unit_qty: u32,
}

impl Packaging {
    pub fn units_for(&self, pack_count: u32) -> u64 {
        u64::from(pack_count) * u64::from(self.unit_qty)
    }
}
