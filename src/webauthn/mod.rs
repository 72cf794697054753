//! # WebAuthn Module
//!
//! Passkey ceremonies for merchant accounts.
//!
//! ## Submodules
//! - `codec`: transport encodings of binary fields
//! - `challenge_store`: one pending ceremony per identity
//! - `authenticator_data`, `cose`, `verify`: parsing and cryptographic checks
//! - `registration`, `authentication`: the two ceremonies
//! - `types`: request bodies and option documents
//!
//! ## Flow
//!
//! ### Registration (creating a passkey)
//! 1. `registration::begin_registration()` checks the merchant finished
//!    onboarding and has no passkey yet, stores a challenge and returns
//!    creation options
//! 2. The browser calls `navigator.credentials.create()`
//! 3. `registration::finish_registration()` consumes the challenge, verifies
//!    the attestation and stores the public key
//!
//! ### Authentication (logging in)
//! 1. `authentication::begin_authentication()` stores a challenge and returns
//!    request options without an allow list
//! 2. The browser calls `navigator.credentials.get()`
//! 3. `authentication::complete_authentication()` consumes the challenge,
//!    finds the credential and verifies the signature; the handler then issues
//!    a session token

pub mod authentication;
pub mod authenticator_data;
pub mod challenge_store;
pub mod codec;
pub mod cose;
pub mod registration;
pub mod types;
pub mod verify;

use crate::config::Config;
use types::{RelyingPartyEntity, UserVerification};

/// Relying-party settings every ceremony checks against
#[derive(Debug, Clone)]
pub struct RelyingParty {
    /// Effective domain; its SHA-256 must equal `rpIdHash`
    pub id: String,
    pub name: String,
    /// The only origin accepted for registration
    pub origin: String,
    /// Origins accepted for login, `origin` first
    pub login_origins: Vec<String>,
    pub user_verification: UserVerification,
    pub timeout_ms: u64,
}

impl RelyingParty {
    pub fn from_config(config: &Config) -> Self {
        Self {
            id: config.rp_id.clone(),
            name: config.rp_name.clone(),
            origin: config.rp_origin.clone(),
            login_origins: config.login_origins(),
            user_verification: config.user_verification,
            timeout_ms: config.ceremony_timeout_ms,
        }
    }

    pub fn entity(&self) -> RelyingPartyEntity {
        RelyingPartyEntity {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}
