//! Browser push subscriptions and the web push transport.
//!
//! Sends encrypted web push messages (RFC 8030, RFC 8291) using VAPID
//! authentication (RFC 8292).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::transport::{DeliveryOutcome, PushTransport};
use super::vapid::VapidKeys;
use crate::error::{PairingError, PairingResult};

/// A browser's push subscription, as produced by `PushSubscription.toJSON()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Subscription expiry as the browser reports it (a possibly fractional
    /// epoch-millisecond timestamp). Stored as given, never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<serde_json::Value>,
    /// Client key material.
    pub keys: SubscriptionKeys,
}

/// Key material for payload encryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
}

impl PushSubscription {
    /// Build a subscription from its three parts.
    pub fn new(
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
        }
    }

    /// Check the subscription is structurally usable before storing it.
    pub fn validate(&self) -> PairingResult<()> {
        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            PairingError::Validation(format!("subscription endpoint is not a URL: {e}"))
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(PairingError::Validation(
                "subscription endpoint must be http(s)".to_string(),
            ));
        }
        if self.keys.p256dh.trim().is_empty() || self.keys.auth.trim().is_empty() {
            return Err(PairingError::Validation(
                "subscription keys are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Web push transport using VAPID authentication.
///
/// Uses the `web-push` crate for RFC 8291 payload encryption and VAPID
/// signing, then sends the HTTP request via a shared `reqwest::Client` for
/// connection pooling.
pub struct WebPushTransport {
    client: reqwest::Client,
    vapid_private_b64: String,
    subject: String,
    ttl: u32,
}

impl std::fmt::Debug for WebPushTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebPushTransport")
            .field("subject", &self.subject)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl WebPushTransport {
    /// Create a transport signing with `keys`.
    ///
    /// `timeout` bounds each HTTP request to the push service.
    pub fn new(keys: &VapidKeys, subject: &str, ttl: u32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build push HTTP client")?;

        Ok(Self {
            client,
            vapid_private_b64: keys.private_key_base64url().to_string(),
            subject: subject.to_string(),
            ttl,
        })
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<DeliveryOutcome> {
        use web_push::{
            ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder,
        };

        let sub_info = SubscriptionInfo::new(
            &subscription.endpoint,
            &subscription.keys.p256dh,
            &subscription.keys.auth,
        );

        let mut sig_builder = VapidSignatureBuilder::from_base64(&self.vapid_private_b64, &sub_info)
            .context("Failed to build VAPID signature")?;
        sig_builder.add_claim("sub", self.subject.as_str());
        let sig = sig_builder.build().context("Failed to sign VAPID JWT")?;

        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(sig);
        builder.set_ttl(self.ttl);

        let message = builder.build().context("Failed to build web push message")?;

        let mut request = self
            .client
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string());

        if let Some(urgency) = message.urgency {
            request = request.header("Urgency", urgency.to_string());
        }

        if let Some(topic) = message.topic {
            request = request.header("Topic", topic);
        }

        if let Some(push_payload) = message.payload {
            request = request
                .header("Content-Encoding", push_payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");

            for (key, value) in &push_payload.crypto_headers {
                request = request.header(*key, value.as_str());
            }

            request = request.body(push_payload.content);
        }

        let response = request.send().await.context("Web push HTTP request failed")?;
        let status = response.status().as_u16();

        match status {
            200..=299 => Ok(DeliveryOutcome::Delivered),
            404 | 410 => {
                log::info!("[WebPush] Subscription expired (HTTP {status})");
                Ok(DeliveryOutcome::Gone)
            }
            429 => Err(anyhow::anyhow!("Web push rate limited (HTTP 429)")),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow::anyhow!("Web push send failed (HTTP {status}): {body}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_deserializes_browser_shape() {
        let json = r#"{
            "endpoint": "https://fcm.googleapis.com/fcm/send/abc",
            "expirationTime": null,
            "keys": { "p256dh": "BPub", "auth": "secret" }
        }"#;
        let sub: PushSubscription = serde_json::from_str(json).expect("deserialize");
        assert_eq!(sub.endpoint, "https://fcm.googleapis.com/fcm/send/abc");
        assert_eq!(sub.expiration_time, None);
        assert_eq!(sub.keys.p256dh, "BPub");
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_fractional_expiration_time_is_kept() {
        let json = r#"{
            "endpoint": "https://push.example.com/abc",
            "expirationTime": 1739527200000.5,
            "keys": { "p256dh": "BPub", "auth": "secret" }
        }"#;
        let sub: PushSubscription = serde_json::from_str(json).expect("deserialize");
        assert!(sub.validate().is_ok());

        let round_trip = serde_json::to_value(&sub).unwrap();
        assert_eq!(round_trip["expirationTime"], serde_json::json!(1739527200000.5));
    }

    #[test]
    fn test_subscription_validation() {
        let bad_url = PushSubscription::new("not a url", "k", "a");
        assert!(matches!(bad_url.validate(), Err(PairingError::Validation(_))));

        let bad_scheme = PushSubscription::new("ftp://push.example.com/1", "k", "a");
        assert!(matches!(bad_scheme.validate(), Err(PairingError::Validation(_))));

        let missing_keys = PushSubscription::new("https://push.example.com/1", " ", "a");
        assert!(matches!(missing_keys.validate(), Err(PairingError::Validation(_))));
    }

    #[test]
    fn test_transport_debug_hides_private_key() {
        let keys = VapidKeys::generate().expect("generate keys");
        let transport =
            WebPushTransport::new(&keys, "mailto:test@example.com", 60, Duration::from_secs(5))
                .expect("transport");
        let debug = format!("{transport:?}");
        assert!(!debug.contains(keys.private_key_base64url()));
        assert!(debug.contains("mailto:test@example.com"));
    }
}
