//! "Thinking of you" delivery to a user's partner.
//!
//! Each call makes exactly one delivery attempt. There is no retry; the
//! caller decides whether to try again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::push::PushSubscription;
use super::transport::{DeliveryOutcome, PushTransport};
use crate::constants::{NOTIFICATION_ICON, NOTIFICATION_TAG, NOTIFICATION_TITLE};
use crate::error::{EntityKind, PairingError, PairingResult};
use crate::store::{short_id, PartnerSummary, Store, UserUpdate};

/// JSON body the service worker turns into a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub body: String,
    /// Icon URL path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Collapse tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Extra data for the service worker.
    pub data: NotificationData,
}

/// `data` block of a [`NotificationPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Sender's display name.
    pub from_user: String,
    /// When the nudge was sent.
    pub timestamp: DateTime<Utc>,
}

impl NotificationPayload {
    /// The one message this app sends.
    pub fn thinking_of_you(sender_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            title: NOTIFICATION_TITLE.to_string(),
            body: format!("{sender_name} está pensando en ti"),
            icon: Some(NOTIFICATION_ICON.to_string()),
            tag: Some(NOTIFICATION_TAG.to_string()),
            data: NotificationData {
                from_user: sender_name.to_string(),
                timestamp: now,
            },
        }
    }
}

/// Confirmation of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    /// Who received the notification.
    pub partner: PartnerSummary,
    /// When it was handed to the push service.
    pub sent_at: DateTime<Utc>,
}

/// Resolves a sender's partner and hands one message to the push transport.
#[derive(Debug)]
pub struct NotificationDispatcher {
    store: Arc<Store>,
    transport: Arc<dyn PushTransport>,
    timeout: Duration,
}

impl NotificationDispatcher {
    /// Dispatcher bounding each delivery by `timeout`.
    pub fn new(store: Arc<Store>, transport: Arc<dyn PushTransport>, timeout: Duration) -> Self {
        Self {
            store,
            transport,
            timeout,
        }
    }

    /// Notify `sender_id`'s partner.
    ///
    /// # Errors
    ///
    /// In order of checking: `NotFound` (sender), `NoPartner`, `NotFound`
    /// (stale partner reference), `NoSubscription`, `Delivery`.
    pub async fn notify(&self, sender_id: &str) -> PairingResult<DeliveryReceipt> {
        let sender = self
            .store
            .get_user(sender_id)
            .ok_or_else(|| PairingError::user_not_found(sender_id))?;

        let partner_id = sender.partner_id.as_deref().ok_or(PairingError::NoPartner)?;

        let partner = self
            .store
            .get_user(partner_id)
            .ok_or_else(|| PairingError::NotFound {
                kind: EntityKind::Partner,
                id: partner_id.to_string(),
            })?;

        let subscription = partner
            .push_subscription
            .clone()
            .ok_or(PairingError::NoSubscription)?;

        let now = Utc::now();
        let payload = NotificationPayload::thinking_of_you(&sender.name, now);
        let body = serde_json::to_vec(&payload).map_err(|e| PairingError::Delivery {
            permanent: false,
            reason: format!("failed to encode payload: {e}"),
        })?;

        let outcome = tokio::time::timeout(self.timeout, self.transport.send(&subscription, &body))
            .await
            .map_err(|_elapsed| PairingError::Delivery {
                permanent: false,
                reason: format!("timed out after {:?}", self.timeout),
            })?
            .map_err(|e| {
                log::warn!(
                    "[Notify] Delivery to {} failed: {e:#}",
                    short_id(&partner.id)
                );
                PairingError::Delivery {
                    permanent: false,
                    reason: format!("{e:#}"),
                }
            })?;

        match outcome {
            DeliveryOutcome::Delivered => {
                log::info!(
                    "[Notify] {} -> {} delivered",
                    short_id(&sender.id),
                    short_id(&partner.id)
                );
                Ok(DeliveryReceipt {
                    partner: partner.summary(),
                    sent_at: now,
                })
            }
            DeliveryOutcome::Gone => {
                self.forget_subscription(&partner.id, &subscription);
                Err(PairingError::Delivery {
                    permanent: true,
                    reason: "push subscription expired".to_string(),
                })
            }
        }
    }

    /// Drop a subscription the push service reported gone, unless the
    /// partner has re-subscribed in the meantime.
    fn forget_subscription(&self, partner_id: &str, stale: &PushSubscription) {
        let result = self.store.transaction(|state| {
            let still_current = state
                .user(partner_id)
                .and_then(|user| user.push_subscription.as_ref())
                .is_some_and(|current| current.endpoint == stale.endpoint);
            if still_current {
                state.update_user(partner_id, UserUpdate::clear_subscription());
            }
            Ok(still_current)
        });

        match result {
            Ok(true) => log::info!(
                "[Notify] Cleared expired subscription for {}",
                short_id(partner_id)
            ),
            Ok(false) => {}
            Err(e) => log::warn!("[Notify] Could not clear expired subscription: {e}"),
        }
    }
}
