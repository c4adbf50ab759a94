//! CLI subcommand implementations for ivathy.
//!
//! Each command maps onto one [`Ivathy`](crate::service::Ivathy) operation
//! and prints the JSON response to stdout. Commands are organized by domain:
//!
//! - [`pair`] - identities and pairing (create-user, generate-code, join, status)
//! - [`push`] - subscriptions, notifications and VAPID keys

pub mod pair;
pub mod push;

use anyhow::Result;
use serde::Serialize;

/// Pretty-print a response as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
