//! # Passkey Authentication
//!
//! `begin_authentication` issues an open request (no allow list, so the
//! authenticator offers its discoverable credential). `complete_authentication`
//! matches the returned credential id against the merchant's stored records,
//! checks the signature with the stored COSE key and advances the counter.

use crate::db::models::CredentialRecord;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::upstream::bounded;
use crate::webauthn::authenticator_data::AuthenticatorData;
use crate::webauthn::challenge_store::{
    generate_challenge, Ceremony, CeremonyParameters, ChallengeState,
};
use crate::webauthn::codec;
use crate::webauthn::cose::{signed_payload, CosePublicKey};
use crate::webauthn::types::{RequestOptions, CLIENT_DATA_GET};
use crate::webauthn::verify;
use serde_json::Value;

/// Start a login for `identity`
///
/// ## Flow
/// 1. Load the merchant's credentials; none means there is nothing to log in with
/// 2. Generate a challenge and remember it with the expected user handle
/// 3. Return open request options (no allow list)
///
/// ## Errors
/// - `NotFound`: no passkey registered for the identity
/// - `UpstreamTimeout`: persistence did not answer in time
pub async fn begin_authentication(state: &AppState, identity: &str) -> AppResult<RequestOptions> {
    let credentials = bounded(
        state.config.upstream_timeout,
        "credential lookup",
        state.persistence.find_credentials_by_identity(identity),
    )
    .await?;

    if credentials.is_empty() {
        return Err(AppError::NotFound(format!("no passkey registered for '{identity}'")));
    }

    let rp = &state.rp;
    let challenge = generate_challenge();
    let options = RequestOptions {
        challenge: codec::encode_for_transport(&challenge),
        rp_id: rp.id.clone(),
        timeout: rp.timeout_ms,
        user_verification: rp.user_verification,
    };

    state.challenges.put(
        identity,
        ChallengeState::new(
            challenge,
            CeremonyParameters {
                ceremony: Ceremony::Authentication,
                user_verification: rp.user_verification,
                user_handle: identity.as_bytes().to_vec(),
            },
            state.config.challenge_ttl,
        ),
    );

    tracing::debug!(identity, "authentication options issued");
    Ok(options)
}

/// Verify an assertion and return the credential that produced it
///
/// `assertion` is `{rawId, response: {clientDataJSON, authenticatorData,
/// signature, userHandle?}}`; the members of `response` may also sit at the
/// top level.
///
/// Check order: pending challenge, required fields, credential lookup, then
/// the client data, authenticator data, user handle, signature and counter.
/// The session token is issued by the caller.
///
/// ## Errors
/// - `NoChallenge` / `Expired`: nothing usable pending
/// - `MalformedRequest`: rawId, clientDataJSON, authenticatorData or signature missing
/// - `UnknownCredential`: rawId matches none of the merchant's records
/// - `VerificationFailed`: origin, challenge, flags, user handle, signature or
///   a counter that did not advance
pub async fn complete_authentication(
    state: &AppState,
    identity: &str,
    assertion: &Value,
) -> AppResult<CredentialRecord> {
    let result = complete(state, identity, assertion).await;
    match &result {
        Ok(record) => tracing::info!(
            identity,
            credential = %record.id,
            sign_count = record.sign_count,
            "passkey login"
        ),
        Err(e) => tracing::warn!(identity, error = e.code(), "login failed: {}", e),
    }
    result
}

async fn complete(state: &AppState, identity: &str, assertion: &Value) -> AppResult<CredentialRecord> {
    let pending = state.challenges.take(identity)?;
    if pending.parameters.ceremony != Ceremony::Authentication {
        return Err(AppError::NoChallenge(identity.to_string()));
    }

    let response = assertion
        .get("response")
        .filter(|r| r.is_object())
        .unwrap_or(assertion);
    let raw_id = codec::required_field(assertion, "rawId")?;
    let client_data_json = codec::required_field(response, "clientDataJSON")?;
    let authenticator_data = codec::required_field(response, "authenticatorData")?;
    let signature = codec::required_field(response, "signature")?;
    let user_handle = codec::optional_field(response, "userHandle")?.filter(|h| !h.is_empty());

    let records = bounded(
        state.config.upstream_timeout,
        "credential lookup",
        state.persistence.find_credentials_by_identity(identity),
    )
    .await?;
    let mut record = records
        .into_iter()
        .find(|r| r.credential_id_bytes() == raw_id)
        .ok_or_else(|| AppError::UnknownCredential(identity.to_string()))?;

    let rp = &state.rp;
    let client_data = verify::parse_client_data(&client_data_json)?;
    verify::verify_client_data(&client_data, CLIENT_DATA_GET, &pending.challenge, &rp.login_origins)?;

    let auth_data = AuthenticatorData::parse(&authenticator_data)?;
    verify::verify_rp_id_hash(&auth_data, &rp.id)?;
    verify::verify_user_flags(&auth_data, pending.parameters.user_verification)?;

    if let Some(handle) = user_handle {
        if handle != pending.parameters.user_handle {
            return Err(AppError::VerificationFailed(
                "user handle does not belong to this identity".to_string(),
            ));
        }
    }

    let public_key = CosePublicKey::from_cbor(&record.public_key)?;
    public_key.verify(&signed_payload(&authenticator_data, &client_data_json), &signature)?;

    verify::verify_sign_count(auth_data.sign_count, record.sign_count())?;

    bounded(
        state.config.upstream_timeout,
        "sign count update",
        state.persistence.update_sign_count(&record.id, auth_data.sign_count),
    )
    .await?;
    record.sign_count = i64::from(auth_data.sign_count);

    Ok(record)
}
