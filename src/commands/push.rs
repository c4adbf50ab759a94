//! Push subscription, notification and VAPID key commands.
//!
//! # Examples
//!
//! ```bash
//! # Generate the server keypair once
//! ivathy vapid-keys
//!
//! # Register a browser subscription (inline JSON or @file)
//! ivathy subscribe --user <id> --subscription @subscription.json
//!
//! # Nudge the partner
//! ivathy notify --user <id>
//! ```

use anyhow::{Context, Result};
use std::fs;

use super::print_json;
use crate::config::Config;
use crate::notifications::{PushSubscription, VapidKeys};
use crate::service::Ivathy;

/// Parse a subscription given inline or as `@path`.
pub fn parse_subscription(arg: &str) -> Result<PushSubscription> {
    let json = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read subscription file {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&json).context("Subscription must be PushSubscription JSON")
}

/// Store a browser push subscription for `user_id`.
pub fn subscribe(app: &Ivathy, user_id: &str, subscription: &str) -> Result<()> {
    let subscription = parse_subscription(subscription)?;
    let response = app.register_subscription(user_id, subscription)?;
    print_json(&response)
}

/// Send the partner of `user_id` a push notification.
pub async fn notify(app: &Ivathy, user_id: &str) -> Result<()> {
    let response = app.notify_partner(user_id).await?;
    print_json(&response)
}

/// Generate and store a VAPID keypair, printing the public key.
///
/// Refuses to replace existing keys unless `force` is set, since every
/// browser subscription is bound to the current public key.
pub fn vapid_keys(config: &mut Config, force: bool) -> Result<()> {
    if let Some(existing) = &config.vapid_keys {
        if !force {
            println!("{}", existing.public_key_base64url());
            eprintln!("VAPID keys already exist; pass --force to replace them.");
            return Ok(());
        }
    }

    let keys = VapidKeys::generate()?;
    let public_key = keys.public_key_base64url().to_string();
    let path = config.save_vapid_keys(keys)?;
    log::info!("Stored VAPID keys at {}", path.display());
    println!("{public_key}");
    Ok(())
}
