//! Provider webhook adapters
//!
//! One adapter per payment processor. An adapter owns two jobs, in order:
//! verify the delivery is authentic, then normalise it into a
//! [`CanonicalEvent`](crate::event::CanonicalEvent). Signature verification
//! happens before any business field is parsed so attacker-controlled
//! payloads are never interpreted.

pub mod gocardless;
pub mod stripe;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;
use treehouse_shared::BillingProvider;

use crate::error::BillingResult;
use crate::event::CanonicalEvent;

pub use gocardless::GocardlessAdapter;
pub use stripe::StripeAdapter;

type HmacSha256 = Hmac<Sha256>;

/// A payment provider's webhook dialect.
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> BillingProvider;

    /// Verify the delivery's signature and normalise the payload.
    ///
    /// `now` is passed in (rather than read from the clock) so replay-window
    /// checks are deterministic under test.
    fn verify_and_parse(
        &self,
        raw_body: &str,
        signature_header: &str,
        now: OffsetDateTime,
    ) -> BillingResult<CanonicalEvent>;
}

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub(crate) fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    // HMAC accepts keys of any length; new_from_slice only fails for
    // algorithms with fixed key sizes.
    #[allow(clippy::expect_used)]
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
