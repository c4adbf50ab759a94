//! Pairing manager: one-time codes that turn two users into a couple.
//!
//! # State machine (per user)
//!
//! ```text
//! Unpaired ──generate_code──► CodeIssued ──partner joins──► Paired
//!     │                                                        ▲
//!     └──────────────── join_with_code(partner's code) ────────┘
//! ```
//!
//! There is no transition back to `Unpaired`.
//!
//! # Codes
//!
//! Six characters from `[A-Z0-9]`, drawn from a [`CodeSource`]. A user has
//! at most one live code: issuing a new one revokes the old. Codes expire
//! after the configured TTL and are consumed by the first successful join.
//! Resolving, validating, committing the couple and consuming the code all
//! happen inside one store transaction, so two racing joins on the same code
//! can never both succeed.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{PAIR_CODE_ALPHABET, PAIR_CODE_LENGTH, PAIR_CODE_MAX_ATTEMPTS};
use crate::error::{PairingError, PairingResult};
use crate::store::{short_id, PairCode, PartnerSummary, Store};

/// Supplies candidate pairing codes.
pub trait CodeSource: Send + Sync + std::fmt::Debug {
    /// Produce the next candidate code.
    fn next_code(&self) -> String;
}

/// Uniformly random codes from the thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> String {
        let mut rng = rand::rng();
        (0..PAIR_CODE_LENGTH)
            .map(|_| char::from(PAIR_CODE_ALPHABET[rng.random_range(0..PAIR_CODE_ALPHABET.len())]))
            .collect()
    }
}

/// Trim and uppercase user input, then check it has the code format.
pub fn normalize_code(input: &str) -> PairingResult<String> {
    let code = input.trim().to_ascii_uppercase();
    let well_formed = code.len() == PAIR_CODE_LENGTH
        && code.bytes().all(|b| PAIR_CODE_ALPHABET.contains(&b));
    if well_formed {
        Ok(code)
    } else {
        Err(PairingError::InvalidCode(format!(
            "codes are {PAIR_CODE_LENGTH} letters or digits"
        )))
    }
}

/// Where a user is in the pairing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    /// No partner and no live code.
    Unpaired,
    /// Waiting for someone to join with this user's code.
    CodeIssued,
    /// Has a partner.
    Paired,
}

/// Issues and redeems pairing codes.
#[derive(Debug)]
pub struct PairingManager {
    store: Arc<Store>,
    codes: Box<dyn CodeSource>,
    code_ttl: Option<Duration>,
}

impl PairingManager {
    /// Manager with random codes and no expiry.
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            codes: Box::new(RandomCodes),
            code_ttl: None,
        }
    }

    /// Replace the code source.
    pub fn with_code_source(mut self, codes: impl CodeSource + 'static) -> Self {
        self.codes = Box::new(codes);
        self
    }

    /// Expire codes after `ttl` (`None` = never).
    pub fn with_code_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.code_ttl = ttl;
        self
    }

    /// Issue a fresh code for `user_id`.
    pub fn generate_code(&self, user_id: &str) -> PairingResult<String> {
        self.generate_code_at(user_id, Utc::now())
    }

    /// [`generate_code`](Self::generate_code) with an explicit clock.
    pub fn generate_code_at(&self, user_id: &str, now: DateTime<Utc>) -> PairingResult<String> {
        let code = self.store.transaction(|state| {
            let user = state
                .user(user_id)
                .ok_or_else(|| PairingError::user_not_found(user_id))?;
            if user.is_paired() {
                return Err(PairingError::AlreadyPaired(user_id.to_string()));
            }

            let purged = state.purge_expired_codes(now, self.code_ttl);
            if purged > 0 {
                log::debug!("[Pairing] Purged {purged} expired codes");
            }
            state.revoke_codes_for(user_id);

            for _ in 0..PAIR_CODE_MAX_ATTEMPTS {
                let Ok(code) = normalize_code(&self.codes.next_code()) else {
                    continue;
                };
                if state.pair_code(&code).is_some() {
                    log::debug!("[Pairing] Code collision, drawing again");
                    continue;
                }
                state.insert_pair_code(
                    code.clone(),
                    PairCode {
                        user_id: user_id.to_string(),
                        issued_at: now,
                    },
                );
                return Ok(code);
            }

            Err(PairingError::InvalidCode(
                "could not allocate a unique code".to_string(),
            ))
        })?;

        log::info!("[Pairing] Issued code for user {}", short_id(user_id));
        Ok(code)
    }

    /// Redeem `code` as `joining_user_id`, committing the couple.
    ///
    /// Returns the issuer's summary.
    pub fn join_with_code(
        &self,
        code: &str,
        joining_user_id: &str,
    ) -> PairingResult<PartnerSummary> {
        self.join_with_code_at(code, joining_user_id, Utc::now())
    }

    /// [`join_with_code`](Self::join_with_code) with an explicit clock.
    pub fn join_with_code_at(
        &self,
        code: &str,
        joining_user_id: &str,
        now: DateTime<Utc>,
    ) -> PairingResult<PartnerSummary> {
        let code = normalize_code(code)?;

        let issuer = self.store.transaction(|state| {
            let entry = state.pair_code(&code).cloned().ok_or_else(|| {
                PairingError::InvalidCode("unknown or already used".to_string())
            })?;

            if entry.is_expired(now, self.code_ttl) {
                return Err(PairingError::InvalidCode("expired".to_string()));
            }
            if entry.user_id == joining_user_id {
                return Err(PairingError::InvalidCode(
                    "cannot join with your own code".to_string(),
                ));
            }

            let issuer = state
                .user(&entry.user_id)
                .map(|user| user.summary())
                .ok_or_else(|| PairingError::user_not_found(&entry.user_id))?;
            if state.user(joining_user_id).is_none() {
                return Err(PairingError::user_not_found(joining_user_id));
            }

            state.link_couple(joining_user_id, &issuer.id, now)?;
            state.remove_pair_code(&code);
            // The joiner may have issued a code of their own; it is dead now.
            state.revoke_codes_for(joining_user_id);
            Ok(issuer)
        })?;

        log::info!(
            "[Pairing] User {} joined {}",
            short_id(joining_user_id),
            short_id(&issuer.id)
        );
        Ok(issuer)
    }

    /// Current partner of `user_id`, if any.
    ///
    /// Unknown users and dangling partner references read as unpaired.
    pub fn check_pair_status(&self, user_id: &str) -> Option<PartnerSummary> {
        self.store.read(|state| {
            let partner_id = state.user(user_id)?.partner_id.as_deref()?;
            match state.user(partner_id) {
                Some(partner) => Some(partner.summary()),
                None => {
                    log::warn!(
                        "[Pairing] User {} references missing partner {}",
                        short_id(user_id),
                        short_id(partner_id)
                    );
                    None
                }
            }
        })
    }

    /// Lifecycle state of `user_id`, `None` if the user does not exist.
    pub fn pair_state(&self, user_id: &str) -> Option<PairState> {
        self.pair_state_at(user_id, Utc::now())
    }

    fn pair_state_at(&self, user_id: &str, now: DateTime<Utc>) -> Option<PairState> {
        self.store.read(|state| {
            let user = state.user(user_id)?;
            if user.is_paired() {
                return Some(PairState::Paired);
            }
            let has_live_code = state.has_live_code_for(user_id, now, self.code_ttl);
            Some(if has_live_code {
                PairState::CodeIssued
            } else {
                PairState::Unpaired
            })
        })
    }
}
