//! # WebAuthn API Types
//!
//! Request bodies for the ceremony endpoints and the option documents handed
//! to `navigator.credentials.create()` / `.get()`. Binary members are already
//! transport-encoded strings here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// COSE algorithm identifiers the server can verify
pub const COSE_ALG_ES256: i64 = -7;
pub const COSE_ALG_RS256: i64 = -257;

pub const CLIENT_DATA_CREATE: &str = "webauthn.create";
pub const CLIENT_DATA_GET: &str = "webauthn.get";

/// User-verification requirement, as spelled by WebAuthn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

impl UserVerification {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserVerification::Required => "required",
            UserVerification::Preferred => "preferred",
            UserVerification::Discouraged => "discouraged",
        }
    }
}

impl fmt::Display for UserVerification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("expected one of required, preferred, discouraged; got {0:?}")]
pub struct ParseUserVerificationError(String);

impl FromStr for UserVerification {
    type Err = ParseUserVerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "required" => Ok(UserVerification::Required),
            "preferred" => Ok(UserVerification::Preferred),
            "discouraged" => Ok(UserVerification::Discouraged),
            _ => Err(ParseUserVerificationError(s.to_string())),
        }
    }
}

/// `{ "email": "..." }`, the body of both begin endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct BeginRequest {
    pub email: String,
}

/// Body of `POST /login/complete`
///
/// The assertion stays a raw JSON value: its binary members may arrive in
/// any encoding the credential codec understands.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginCompleteRequest {
    pub email: String,
    pub assertion: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub status: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Transport-encoded user handle
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub kind: String,
    pub alg: i64,
}

impl PublicKeyCredentialParameters {
    pub fn public_key(alg: i64) -> Self {
        Self {
            kind: "public-key".to_string(),
            alg,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub user_verification: UserVerification,
    pub resident_key: String,
    pub require_resident_key: bool,
}

/// Options for `navigator.credentials.create()`
///
/// `excludeCredentials` is always `[]`: a merchant that already holds a
/// passkey is turned away before options are built.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub challenge: String,
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    pub timeout: u64,
    pub attestation: String,
    pub authenticator_selection: AuthenticatorSelection,
    #[serde(serialize_with = "empty_list")]
    pub exclude_credentials: (),
}

fn empty_list<S: serde::Serializer>(_: &(), serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(std::iter::empty::<()>())
}

/// Options for `navigator.credentials.get()`
///
/// There is no `allowCredentials`: the request is open, so platform
/// authenticators pick a discoverable credential themselves.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: String,
    pub rp_id: String,
    pub timeout: u64,
    pub user_verification: UserVerification,
}

/// `clientDataJSON` as collected by the browser
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub kind: String,
    /// Base64url challenge, decoded through the codec before comparison
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_verification_parses_case_insensitively() {
        assert_eq!(
            "Required".parse::<UserVerification>().unwrap(),
            UserVerification::Required
        );
        assert!("sometimes".parse::<UserVerification>().is_err());
    }

    #[test]
    fn request_options_carry_no_allow_list() {
        let options = RequestOptions {
            challenge: "abc".into(),
            rp_id: "localhost".into(),
            timeout: 60_000,
            user_verification: UserVerification::Preferred,
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(
            value,
            json!({
                "challenge": "abc",
                "rpId": "localhost",
                "timeout": 60000,
                "userVerification": "preferred"
            })
        );
    }

    #[test]
    fn client_data_tolerates_missing_cross_origin() {
        let data: CollectedClientData = serde_json::from_value(json!({
            "type": "webauthn.get",
            "challenge": "AAEC",
            "origin": "http://localhost:3000"
        }))
        .unwrap();
        assert_eq!(data.kind, CLIENT_DATA_GET);
        assert!(!data.cross_origin);
    }
}
