//! Web push notification infrastructure.
//!
//! Delivers the "thinking of you" nudge from one partner to the other.
//!
//! # Architecture
//!
//! ```text
//! notify(sender)
//!     ↓
//! NotificationDispatcher resolves partner + subscription in the Store
//!     ↓
//! PushTransport (WebPushTransport: RFC 8291 encryption + VAPID)
//!     ↓
//! Browser push service delivers to the partner's service worker
//! ```
//!
//! # VAPID Keys
//!
//! The server holds one P-256 ECDSA keypair (VAPID, RFC 8292). Browsers
//! subscribe with the public key; the private key signs every request.
//!
//! # Push Subscriptions
//!
//! Browsers register their subscription (endpoint + keys) once they grant
//! permission. A subscription the push service reports gone (404/410) is
//! cleared from the partner's record.

pub mod dispatcher;
pub mod push;
pub mod transport;
pub mod vapid;

pub use dispatcher::{DeliveryReceipt, NotificationDispatcher, NotificationPayload};
pub use push::{PushSubscription, SubscriptionKeys, WebPushTransport};
pub use transport::{DeliveryOutcome, PushTransport};
pub use vapid::VapidKeys;
