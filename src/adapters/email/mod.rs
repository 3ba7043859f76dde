//! Email adapters.

mod http_sender;

pub use http_sender::{EmailApiConfig, HttpNotificationSender};
