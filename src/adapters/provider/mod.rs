//! Payment provider adapters.

mod http_client;
mod mock_client;
mod webhook_verifier;

pub use http_client::{HttpProviderClient, ProviderApiConfig};
pub use mock_client::MockProviderClient;
pub use webhook_verifier::{SignatureHeader, WebhookSignatureVerifier, WebhookVerifyError};
