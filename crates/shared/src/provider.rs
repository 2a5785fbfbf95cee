//! Payment provider tags
//!
//! Exactly one provider is *active* for new checkouts at a time (selected by
//! configuration), but every configured provider keeps receiving and applying
//! webhooks for subscriptions it created.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingProvider {
    Stripe,
    Gocardless,
}

impl BillingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingProvider::Stripe => "stripe",
            BillingProvider::Gocardless => "gocardless",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stripe" => Some(BillingProvider::Stripe),
            "gocardless" => Some(BillingProvider::Gocardless),
            _ => None,
        }
    }

    /// HTTP header carrying this provider's webhook signature.
    pub fn signature_header(&self) -> &'static str {
        match self {
            BillingProvider::Stripe => "stripe-signature",
            BillingProvider::Gocardless => "webhook-signature",
        }
    }
}

impl std::fmt::Display for BillingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
