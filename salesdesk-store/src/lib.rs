pub mod app_config;
pub mod envelope;
pub mod erp_client;
pub mod http;
pub mod local_client;

pub use app_config::Config;
pub use envelope::EnvelopeError;
pub use erp_client::ErpClient;
pub use http::HttpService;
pub use local_client::{HttpLookup, LocalApiClient};
