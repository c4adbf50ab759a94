//! Persistent entities: users, couples and pairing codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::notifications::PushSubscription;

/// A person using the app.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Opaque unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Set once the client completes a push subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_subscription: Option<PushSubscription>,
    /// The other half of the couple, always symmetric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Fresh user with no subscription and no partner.
    pub fn new(id: impl Into<String>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            push_subscription: None,
            partner_id: None,
            created_at,
        }
    }

    /// Public `{id, name}` view shared with the partner.
    pub fn summary(&self) -> PartnerSummary {
        PartnerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// Whether this user already has a partner.
    pub fn is_paired(&self) -> bool {
        self.partner_id.is_some()
    }
}

/// What one partner may see about the other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSummary {
    /// Partner's user id.
    pub id: String,
    /// Partner's display name.
    pub name: String,
}

/// Shallow merge of user fields.
///
/// Outer `None` leaves the field untouched; `Some(None)` clears an optional
/// field.
///
/// The partner reference is not settable from outside the crate; couples are
/// only formed through [`Store::create_couple`](crate::store::Store::create_couple)
/// or a pairing code, which update both sides together.
///
/// ```compile_fail
/// let update = ivathy::store::UserUpdate {
///     partner_id: Some(Some("someone".to_string())),
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug, Default)]
pub struct UserUpdate {
    /// Replace the display name.
    pub name: Option<String>,
    /// Set or clear the push subscription.
    pub push_subscription: Option<Option<PushSubscription>>,
    /// Set or clear the partner reference.
    pub(crate) partner_id: Option<Option<String>>,
}

impl UserUpdate {
    /// Update that only sets the push subscription.
    pub fn subscription(subscription: PushSubscription) -> Self {
        Self {
            push_subscription: Some(Some(subscription)),
            ..Self::default()
        }
    }

    /// Update that only clears the push subscription.
    pub fn clear_subscription() -> Self {
        Self {
            push_subscription: Some(None),
            ..Self::default()
        }
    }

    pub(crate) fn partner(partner_id: &str) -> Self {
        Self {
            partner_id: Some(Some(partner_id.to_string())),
            ..Self::default()
        }
    }

    pub(crate) fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(subscription) = self.push_subscription {
            user.push_subscription = subscription;
        }
        if let Some(partner_id) = self.partner_id {
            user.partner_id = partner_id;
        }
    }
}

/// A committed, symmetric partnership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Couple {
    /// Derived from both member ids, independent of argument order.
    pub id: String,
    /// The member who completed the pairing.
    pub user1_id: String,
    /// The member who issued the code.
    pub user2_id: String,
    /// When the pairing was committed.
    pub created_at: DateTime<Utc>,
}

impl Couple {
    /// Deterministic couple id for two members.
    pub fn couple_id(a: &str, b: &str) -> String {
        if a <= b {
            format!("{a}_{b}")
        } else {
            format!("{b}_{a}")
        }
    }

    pub(crate) fn new(user1_id: &str, user2_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Self::couple_id(user1_id, user2_id),
            user1_id: user1_id.to_string(),
            user2_id: user2_id.to_string(),
            created_at,
        }
    }
}

/// An outstanding pairing code's target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairCode {
    /// User who generated the code.
    pub user_id: String,
    /// When the code was issued.
    pub issued_at: DateTime<Utc>,
}

impl PairCode {
    /// Whether the code has outlived `ttl` at `now`. `None` never expires.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Option<Duration>) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.issued_at >= ttl,
            Err(_) => false,
        }
    }
}
