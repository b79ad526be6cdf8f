pub mod customer;
pub mod policy;
pub mod product;
pub mod pricing;
pub mod warehouse;

pub use customer::{Customer, DeliveryAddress, Territory};
pub use policy::{Policy, PolicyKey, PolicyType, ReferencePolicy};
pub use product::{Packaging, Product};
pub use pricing::{line_total, PriceQuote, PricingError};
pub use warehouse::Warehouse;
