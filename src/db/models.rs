//! # Database Models
//!
//! Row types for the `merchants` and `credentials` tables.
//!
//! Timestamps are RFC 3339 strings, the way SQLite stores them as TEXT.

use crate::webauthn::codec;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Company details collected by the onboarding form
///
/// Also the payload carried inside a magic-link token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantProfile {
    pub name: String,
    /// ISO 3166-1 alpha-3 country code
    pub country: String,
    pub city: String,
    pub postal_code: String,
    pub address: String,
    pub email: String,
    pub tax_number: String,
}

impl MerchantProfile {
    /// Trim the email so it matches the identity the ceremony endpoints use
    pub fn normalized(mut self) -> Self {
        self.email = self.email.trim().to_string();
        self
    }
}

/// A merchant (company) that completed onboarding
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Merchant {
    pub id: String,
    pub email: String,
    pub name: String,
    pub country_alpha_3: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
    pub created_at: String,
}

impl Merchant {
    pub fn new(profile: MerchantProfile) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: profile.email,
            name: profile.name,
            country_alpha_3: Some(profile.country),
            city: Some(profile.city),
            postal_code: Some(profile.postal_code),
            address: Some(profile.address),
            tax_number: Some(profile.tax_number),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A registered passkey
///
/// `credential_id` is the text column as found in the table. Rows written by
/// this server hold unpadded URL-safe base64; older rows may hold other
/// encodings, so always compare through [`CredentialRecord::credential_id_bytes`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CredentialRecord {
    pub id: String,
    pub email: String,
    pub credential_id: String,
    /// COSE_Key as returned by the authenticator
    #[serde(skip_serializing)]
    pub public_key: Vec<u8>,
    pub sign_count: i64,
    /// JSON array of transport hints, e.g. `["internal","hybrid"]`
    pub transports: Option<String>,
    pub attestation_type: String,
    pub aaguid: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl CredentialRecord {
    pub fn new(
        email: &str,
        credential_id: &[u8],
        public_key: Vec<u8>,
        sign_count: u32,
        transports: &[String],
        attestation_type: String,
        aaguid: String,
    ) -> Self {
        let transports = if transports.is_empty() {
            None
        } else {
            serde_json::to_string(transports).ok()
        };

        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            credential_id: codec::encode_for_transport(credential_id),
            public_key,
            sign_count: i64::from(sign_count),
            transports,
            attestation_type,
            aaguid,
            created_at: Utc::now().to_rfc3339(),
            last_used_at: None,
        }
    }

    /// Canonical credential id bytes, whatever encoding the row uses
    pub fn credential_id_bytes(&self) -> Vec<u8> {
        codec::decode_stored_credential_id(&self.credential_id)
    }

    /// Stored counter; out-of-range values from hand-edited rows clamp
    pub fn sign_count(&self) -> u32 {
        u32::try_from(self.sign_count.max(0)).unwrap_or(u32::MAX)
    }

    pub fn transports(&self) -> Vec<String> {
        self.transports
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default()
    }
}
