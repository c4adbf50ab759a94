//! Application-wide constants for ivathy.
//!
//! Centralizes the magic numbers for pairing codes, delivery timeouts and
//! notification branding.
//!
//! # Categories
//!
//! - **Pairing**: code format, lifetime and collision handling
//! - **Delivery**: push service timeouts and message TTL
//! - **Notification**: fixed payload content

use std::time::Duration;

// ============================================================================
// Pairing
// ============================================================================

/// Number of characters in a pairing code.
pub const PAIR_CODE_LENGTH: usize = 6;

/// Characters a pairing code is drawn from (uppercase alphanumeric).
///
/// 36^6 ≈ 2.2 billion combinations, far beyond what can be guessed within a
/// code's lifetime.
pub const PAIR_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many times to redraw a code that collides with a live mapping.
pub const PAIR_CODE_MAX_ATTEMPTS: usize = 16;

/// Default lifetime of an unconsumed pairing code.
pub const DEFAULT_PAIR_CODE_TTL: Duration = Duration::from_secs(15 * 60);

// ============================================================================
// Delivery
// ============================================================================

/// Upper bound on a single push delivery attempt.
///
/// One unreachable push service must never stall the caller indefinitely.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the push service should hold an undelivered message (seconds).
pub const DEFAULT_PUSH_TTL_SECS: u32 = 86_400;

/// Default VAPID `sub` claim.
pub const DEFAULT_VAPID_SUBJECT: &str = "mailto:admin@ivathy.app";

// ============================================================================
// Notification
// ============================================================================

/// Fixed notification title.
pub const NOTIFICATION_TITLE: &str = "💕 Ivathy";

/// Icon shown with the notification.
pub const NOTIFICATION_ICON: &str = "/icons/icon-192x192.png";

/// Notification tag so repeated nudges collapse into one on the device.
pub const NOTIFICATION_TAG: &str = "thinking-of-you";
