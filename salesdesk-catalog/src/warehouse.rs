use serde::{Deserialize, Serialize};

/// Stock location an order ships from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Warehouse {
    pub id: String,
    pub name: String,
}
