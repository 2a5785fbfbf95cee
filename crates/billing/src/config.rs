//! Billing configuration

use treehouse_shared::BillingProvider;

use crate::error::{BillingError, BillingResult};

/// Provider selection and signing secrets, from the environment.
///
/// The active provider is the one new checkouts go through; any provider with
/// a configured secret still verifies and applies its own webhooks, since
/// subscriptions created under a previous provider keep emitting events.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub active_provider: BillingProvider,
    pub stripe_webhook_secret: Option<String>,
    pub gocardless_webhook_secret: Option<String>,
}

impl BillingConfig {
    pub fn from_env() -> BillingResult<Self> {
        let active = std::env::var("ACTIVE_BILLING_PROVIDER").unwrap_or_else(|_| "stripe".into());
        let active_provider = BillingProvider::from_str(&active)
            .ok_or(BillingError::UnknownProvider(active))?;

        let config = Self {
            active_provider,
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
            gocardless_webhook_secret: std::env::var("GOCARDLESS_WEBHOOK_SECRET").ok(),
        };

        if config.secret_for(active_provider).is_none() {
            return Err(BillingError::ProviderNotConfigured(active_provider));
        }

        Ok(config)
    }

    pub fn secret_for(&self, provider: BillingProvider) -> Option<&str> {
        match provider {
            BillingProvider::Stripe => self.stripe_webhook_secret.as_deref(),
            BillingProvider::Gocardless => self.gocardless_webhook_secret.as_deref(),
        }
    }
}
