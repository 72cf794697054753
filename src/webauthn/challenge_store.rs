//! # Challenge Store
//!
//! Holds the one in-flight ceremony per user identity between `begin` and
//! `finish`/`complete`.
//!
//! The store is injected into [`AppState`](crate::state::AppState) as an
//! `Arc<dyn ChallengeStore>`. A later `begin` for the same identity silently
//! replaces an unconsumed entry; the replaced ceremony then fails its
//! challenge comparison. Entries are lost on restart.

use crate::error::{AppError, AppResult};
use crate::webauthn::types::UserVerification;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Challenge length in bytes
pub const CHALLENGE_LEN: usize = 32;

/// Fresh challenge from the operating system RNG
pub fn generate_challenge() -> Vec<u8> {
    let mut challenge = vec![0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceremony {
    Registration,
    Authentication,
}

/// Ceremony-specific parameters remembered between the two legs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyParameters {
    pub ceremony: Ceremony,
    pub user_verification: UserVerification,
    /// The user handle issued (registration) or expected back (authentication)
    pub user_handle: Vec<u8>,
}

#[derive(Clone)]
pub struct ChallengeState {
    pub challenge: Vec<u8>,
    pub parameters: CeremonyParameters,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ChallengeState {
    pub fn new(challenge: Vec<u8>, parameters: CeremonyParameters, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        Self {
            challenge,
            parameters,
            issued_at,
            expires_at: issued_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// Challenge bytes stay out of logs
impl fmt::Debug for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeState")
            .field("challenge", &format_args!("<{} bytes>", self.challenge.len()))
            .field("parameters", &self.parameters.ceremony)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub trait ChallengeStore: Send + Sync {
    /// Store `state` for `identity`, replacing any pending entry
    fn put(&self, identity: &str, state: ChallengeState);

    /// Remove and return the pending entry
    ///
    /// `NoChallenge` when nothing is pending, `Expired` when the entry outlived
    /// its TTL (the entry is removed either way).
    fn take(&self, identity: &str) -> AppResult<ChallengeState>;

    /// Drop every expired entry, returning how many were removed
    fn purge_expired(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryChallengeStore {
    entries: Mutex<HashMap<String, ChallengeState>>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, ChallengeState>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChallengeStore for InMemoryChallengeStore {
    fn put(&self, identity: &str, state: ChallengeState) {
        if self.entries().insert(identity.to_string(), state).is_some() {
            tracing::debug!(identity, "replaced pending ceremony");
        }
    }

    fn take(&self, identity: &str) -> AppResult<ChallengeState> {
        let state = self
            .entries()
            .remove(identity)
            .ok_or_else(|| AppError::NoChallenge(identity.to_string()))?;

        if state.is_expired(Utc::now()) {
            return Err(AppError::Expired(identity.to_string()));
        }
        Ok(state)
    }

    fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, state| !state.is_expired(now));
        before - entries.len()
    }
}
