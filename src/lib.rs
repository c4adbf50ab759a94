//! Ivathy - pair with your partner and send a "thinking of you" push.
//!
//! Two users pair through a short one-time code; afterwards either can
//! nudge the other with a web push notification.
//!
//! # Architecture
//!
//! - **Store** - users, couples and pairing codes behind one lock, mirrored
//!   to a JSON snapshot after every mutation
//! - **Pairing** - issues and redeems one-time codes, commits couples
//! - **Notifications** - resolves the partner and delivers one web push
//! - **Service** - the operations the surrounding application calls
//!
//! # Modules
//!
//! - [`store`] - identity store and snapshot persistence
//! - [`pairing`] - pairing manager
//! - [`notifications`] - dispatcher, push transport, VAPID keys
//! - [`service`] - application-facing operations
//! - [`config`] - configuration loading/saving

pub mod commands;
pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod notifications;
pub mod pairing;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{EntityKind, PairingError, PairingResult};
pub use notifications::{NotificationDispatcher, PushSubscription, PushTransport};
pub use pairing::{PairState, PairingManager};
pub use service::Ivathy;
pub use store::{Couple, PartnerSummary, Store, User};
