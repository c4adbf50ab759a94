//! Application-facing operations.
//!
//! [`Ivathy`] wires the store, pairing manager and dispatcher together and
//! exposes the request/response contracts a transport (HTTP routes, the
//! CLI) maps onto:
//!
//! | Operation | Success | Failures |
//! |---|---|---|
//! | `create_identity` | [`User`] | validation |
//! | `generate_pairing_code` | [`PairCodeResponse`] | not-found, already-paired |
//! | `join_pairing` | [`PartnerResponse`] | invalid code, not-found, already-paired |
//! | `check_pair_status` | [`PartnerResponse`] | not-found |
//! | `register_subscription` | [`MessageResponse`] | validation, not-found |
//! | `notify_partner` | [`MessageResponse`] | not-found, no-partner, no-subscription, delivery |

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{PairingError, PairingResult};
use crate::notifications::{NotificationDispatcher, PushSubscription, WebPushTransport};
use crate::pairing::PairingManager;
use crate::store::{PartnerSummary, Store, User, UserUpdate};

/// Response to a code generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairCodeResponse {
    /// The code to share with the partner.
    pub pair_code: String,
    /// Human-readable confirmation.
    pub message: String,
}

/// Response carrying the partner, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerResponse {
    /// `null` when unpaired.
    pub partner: Option<PartnerSummary>,
    /// Human-readable confirmation, omitted for plain status reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Plain acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable confirmation.
    pub message: String,
}

/// The pairing + notification application.
#[derive(Debug)]
pub struct Ivathy {
    store: Arc<Store>,
    pairing: PairingManager,
    dispatcher: Option<NotificationDispatcher>,
    vapid_public_key: Option<String>,
}

impl Ivathy {
    /// Assemble from parts. Without a dispatcher, `notify_partner` fails
    /// with a delivery error.
    pub fn new(
        store: Arc<Store>,
        pairing: PairingManager,
        dispatcher: Option<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            pairing,
            dispatcher,
            vapid_public_key: None,
        }
    }

    /// Build the production wiring from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let data_file = config.data_file()?;
        let store = Arc::new(
            Store::open(&data_file)
                .with_context(|| format!("Failed to open store at {}", data_file.display()))?,
        );

        let pairing =
            PairingManager::new(Arc::clone(&store)).with_code_ttl(config.pair_code_ttl());

        let (dispatcher, vapid_public_key) = match &config.vapid_keys {
            Some(keys) => {
                let transport = WebPushTransport::new(
                    keys,
                    &config.vapid_subject,
                    config.push_ttl_secs,
                    config.delivery_timeout(),
                )?;
                let dispatcher = NotificationDispatcher::new(
                    Arc::clone(&store),
                    Arc::new(transport),
                    config.delivery_timeout(),
                );
                (Some(dispatcher), Some(keys.public_key_base64url().to_string()))
            }
            None => {
                log::warn!("[Ivathy] No VAPID keys configured, push delivery disabled");
                (None, None)
            }
        };

        Ok(Self {
            store,
            pairing,
            dispatcher,
            vapid_public_key,
        })
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// VAPID public key browsers subscribe with, when push is configured.
    pub fn vapid_public_key(&self) -> Option<&str> {
        self.vapid_public_key.as_deref()
    }

    /// Create a user with a fresh random id.
    pub fn create_identity(&self, name: &str) -> PairingResult<User> {
        let id = uuid::Uuid::new_v4().to_string();
        self.store.create_user(&id, name)
    }

    /// Issue a pairing code for `user_id`.
    pub fn generate_pairing_code(&self, user_id: &str) -> PairingResult<PairCodeResponse> {
        let pair_code = self.pairing.generate_code(user_id)?;
        Ok(PairCodeResponse {
            pair_code,
            message: "Código generado exitosamente".to_string(),
        })
    }

    /// Join the user who issued `code`.
    pub fn join_pairing(&self, user_id: &str, code: &str) -> PairingResult<PartnerResponse> {
        let partner = self.pairing.join_with_code(code, user_id)?;
        Ok(PartnerResponse {
            partner: Some(partner),
            message: Some("Emparejamiento exitoso".to_string()),
        })
    }

    /// Current partner, `partner: null` when unpaired.
    pub fn check_pair_status(&self, user_id: &str) -> PairingResult<PartnerResponse> {
        if self.store.get_user(user_id).is_none() {
            return Err(PairingError::user_not_found(user_id));
        }
        Ok(PartnerResponse {
            partner: self.pairing.check_pair_status(user_id),
            message: None,
        })
    }

    /// Store the browser's push subscription for `user_id`.
    pub fn register_subscription(
        &self,
        user_id: &str,
        subscription: PushSubscription,
    ) -> PairingResult<MessageResponse> {
        subscription.validate()?;
        self.store
            .update_user(user_id, UserUpdate::subscription(subscription))?
            .ok_or_else(|| PairingError::user_not_found(user_id))?;
        Ok(MessageResponse {
            message: "Subscription saved successfully".to_string(),
        })
    }

    /// Send the "thinking of you" push to `user_id`'s partner.
    pub async fn notify_partner(&self, user_id: &str) -> PairingResult<MessageResponse> {
        let dispatcher = self.dispatcher.as_ref().ok_or_else(|| PairingError::Delivery {
            permanent: false,
            reason: "push delivery is not configured (no VAPID keys)".to_string(),
        })?;
        let receipt = dispatcher.notify(user_id).await?;
        Ok(MessageResponse {
            message: format!("Notificación enviada a {}", receipt.partner.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> Ivathy {
        let store = Arc::new(Store::in_memory());
        let pairing = PairingManager::new(Arc::clone(&store));
        Ivathy::new(store, pairing, None)
    }

    #[test]
    fn test_create_identity_assigns_unique_ids() {
        let app = app();
        let a = app.create_identity("Ana").unwrap();
        let b = app.create_identity("Ana").unwrap();
        assert_ne!(a.id, b.id);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
        assert!(a.partner_id.is_none());
    }

    #[test]
    fn test_create_identity_requires_name() {
        assert!(matches!(
            app().create_identity(""),
            Err(PairingError::Validation(_))
        ));
    }

    #[test]
    fn test_check_pair_status_unknown_user() {
        assert!(matches!(
            app().check_pair_status("ghost"),
            Err(PairingError::NotFound { .. })
        ));
    }

    #[test]
    fn test_pair_and_status_responses() {
        let app = app();
        let ana = app.create_identity("Ana").unwrap();
        let luis = app.create_identity("Luis").unwrap();

        let status = app.check_pair_status(&ana.id).unwrap();
        assert_eq!(serde_json::to_value(&status).unwrap(), serde_json::json!({ "partner": null }));

        let code = app.generate_pairing_code(&ana.id).unwrap();
        let joined = app.join_pairing(&luis.id, &code.pair_code).unwrap();
        assert_eq!(joined.partner, Some(ana.summary()));

        let status = app.check_pair_status(&ana.id).unwrap();
        assert_eq!(status.partner, Some(luis.summary()));
    }

    #[test]
    fn test_register_subscription() {
        let app = app();
        let ana = app.create_identity("Ana").unwrap();
        let sub = PushSubscription::new("https://push.example.com/ana", "key", "auth");

        assert!(matches!(
            app.register_subscription("ghost", sub.clone()),
            Err(PairingError::NotFound { .. })
        ));
        app.register_subscription(&ana.id, sub.clone()).unwrap();
        assert_eq!(
            app.store().get_user(&ana.id).unwrap().push_subscription,
            Some(sub)
        );
    }

    #[test]
    fn test_from_config_exposes_vapid_public_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let keys = crate::notifications::VapidKeys::generate().unwrap();
        let config = Config {
            data_file: Some(dir.path().join("db.json")),
            vapid_keys: Some(keys.clone()),
            ..Config::default()
        };

        let app = Ivathy::from_config(&config).unwrap();
        assert_eq!(app.vapid_public_key(), Some(keys.public_key_base64url()));

        let ana = app.create_identity("Ana").unwrap();
        assert!(dir.path().join("db.json").exists());
        assert_eq!(app.store().get_user(&ana.id), Some(ana));
    }

    #[test]
    fn test_from_config_without_vapid_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            data_file: Some(dir.path().join("db.json")),
            ..Config::default()
        };
        assert_eq!(Ivathy::from_config(&config).unwrap().vapid_public_key(), None);
    }

    #[tokio::test]
    async fn test_notify_without_push_configured() {
        let app = app();
        let ana = app.create_identity("Ana").unwrap();
        assert!(matches!(
            app.notify_partner(&ana.id).await,
            Err(PairingError::Delivery { .. })
        ));
    }
}
