use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Territory {
    pub id: String,
    pub name: String,
}

/// A delivery location owned by a customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryAddress {
    /// `None` for the implicit address derived from the customer name.
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub territory_id: String,
    #[serde(default)]
    pub addresses: Vec<DeliveryAddress>,
}

impl Customer {
    /// Addresses a line may ship to. A customer without registered addresses
    /// ships to a single implicit address labelled with its own name.
    pub fn delivery_addresses(&self) -> Vec<DeliveryAddress> {
        if self.addresses.is_empty() {
            vec![DeliveryAddress {
                id: None,
                label: self.name.clone(),
            }]
        } else {
            self.addresses.clone()
        }
    }

    pub fn find_address(&self, label: &str) -> Option<DeliveryAddress> {
        self.delivery_addresses()
            .into_iter()
            .find(|a| a.label == label || a.id.as_deref() == Some(label))
    }
}
