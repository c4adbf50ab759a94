//! Push transport seam.
//!
//! The dispatcher only knows this trait. The production implementation is
//! [`WebPushTransport`](super::push::WebPushTransport); tests substitute
//! recording or failing transports.

use async_trait::async_trait;

use super::push::PushSubscription;

/// What the push service said about a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the push service.
    Delivered,
    /// The subscription no longer exists (404/410). It will never work again.
    Gone,
}

/// Delivers an opaque payload to one browser subscription.
#[async_trait]
pub trait PushTransport: Send + Sync + std::fmt::Debug {
    /// Send `payload` to `subscription`.
    ///
    /// # Errors
    ///
    /// Returns an error for any transient or unexpected failure (network
    /// error, rate limiting, non-2xx status other than 404/410).
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> anyhow::Result<DeliveryOutcome>;
}
