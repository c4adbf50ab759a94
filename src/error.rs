//! Error taxonomy for identity, pairing and notification operations.
//!
//! Every failure a caller can observe maps to exactly one variant so the
//! surrounding application can translate outcomes (e.g. into HTTP statuses)
//! without string matching.

/// Which kind of entity a [`PairingError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A user record.
    User,
    /// The partner referenced by a user's `partner_id`.
    Partner,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Partner => write!(f, "Partner"),
        }
    }
}

/// Errors surfaced by the store, the pairing manager and the dispatcher.
#[derive(Debug)]
pub enum PairingError {
    /// Malformed or missing required input.
    Validation(String),
    /// Referenced entity does not exist.
    NotFound {
        /// What was being looked up.
        kind: EntityKind,
        /// The id that failed to resolve.
        id: String,
    },
    /// Unknown, expired, already consumed, or self-issued pairing code.
    InvalidCode(String),
    /// The user already has a partner.
    AlreadyPaired(String),
    /// The sender has no partner to notify.
    NoPartner,
    /// The partner never registered a push subscription.
    NoSubscription,
    /// The push transport failed to deliver.
    Delivery {
        /// `true` when the push service reported the subscription as gone.
        permanent: bool,
        /// Transport-provided reason.
        reason: String,
    },
    /// Snapshot read or write failed.
    Persistence(String),
}

impl PairingError {
    pub(crate) fn user_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: EntityKind::User,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::InvalidCode(_) => "invalid_code",
            Self::AlreadyPaired(_) => "already_paired",
            Self::NoPartner => "no_partner",
            Self::NoSubscription => "no_subscription",
            Self::Delivery { .. } => "delivery_failed",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl std::fmt::Display for PairingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::InvalidCode(msg) => write!(f, "Invalid pairing code: {msg}"),
            Self::AlreadyPaired(id) => write!(f, "User already has a partner: {id}"),
            Self::NoPartner => write!(f, "No partner found"),
            Self::NoSubscription => write!(f, "Partner has no push subscription"),
            Self::Delivery { permanent, reason } => {
                if *permanent {
                    write!(f, "Delivery failed permanently: {reason}")
                } else {
                    write!(f, "Delivery failed: {reason}")
                }
            }
            Self::Persistence(msg) => write!(f, "Persistence error: {msg}"),
        }
    }
}

impl std::error::Error for PairingError {}

/// Result alias for core operations.
pub type PairingResult<T> = std::result::Result<T, PairingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = PairingError::user_not_found("abc");
        assert_eq!(err.to_string(), "User not found: abc");
        assert_eq!(err.code(), "not_found");

        let err = PairingError::Delivery {
            permanent: true,
            reason: "410 Gone".to_string(),
        };
        assert!(err.to_string().contains("permanently"));
    }
}
