//! Webhook registration and verification.
//!
//! The connector subscribes each newly connected shop to `app/uninstalled`
//! ([`WebhookRegistrar`]) and verifies the resulting deliveries
//! ([`verify_webhook`]) before deleting the shop's token.

mod errors;
mod registration;
mod verification;

pub use errors::WebhookError;
pub use registration::{
    RegistrationOutcome, WebhookRegistrar, ACCESS_TOKEN_HEADER, APP_UNINSTALLED_TOPIC,
};
pub use verification::{
    verify_webhook, WebhookContext, WebhookRequest, HEADER_API_VERSION, HEADER_HMAC,
    HEADER_SHOP_DOMAIN, HEADER_TOPIC, HEADER_WEBHOOK_ID,
};
