//! # Passkey Registration
//!
//! Server side of `navigator.credentials.create()`. Registration is a
//! two-step process: begin and finish.
//!
//! ## Registration Flow
//! 1. **Begin**: check the merchant, issue a challenge → send creation options
//! 2. **Finish**: verify the attestation → store the public key
//!
//! ## Rules
//! - Only merchants that completed onboarding (magic link) may register
//! - Each merchant holds a single passkey; `finish` checks again right before
//!   the insert and the `credentials.email` unique index backs it up
//! - The user handle is the identity's UTF-8 bytes, so login can check it
//!   without a lookup

use crate::db::models::CredentialRecord;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::upstream::bounded;
use crate::webauthn::authenticator_data::AttestationObject;
use crate::webauthn::challenge_store::{
    generate_challenge, Ceremony, CeremonyParameters, ChallengeState,
};
use crate::webauthn::codec;
use crate::webauthn::cose::CosePublicKey;
use crate::webauthn::types::{
    AuthenticatorSelection, CreationOptions, PublicKeyCredentialParameters, UserEntity,
    CLIENT_DATA_CREATE, COSE_ALG_ES256, COSE_ALG_RS256,
};
use crate::webauthn::verify;
use serde_json::Value;
use uuid::Uuid;

/// Start a registration ceremony for `identity`
///
/// Step 1 of registration.
///
/// ## Flow
/// 1. Look up the merchant (its name becomes the `displayName`)
/// 2. Make sure no passkey exists yet
/// 3. Generate a fresh challenge and remember it under the identity,
///    replacing any ceremony still pending
/// 4. Return the creation options
///
/// ## Parameters
/// - `state`: application state (persistence, challenge store, RP settings)
/// - `identity`: the merchant's email, already trimmed
///
/// ## Returns
/// `CreationOptions` offering ES256 and RS256, `attestation: "none"` and a
/// preferred (not required) resident key.
///
/// ## Errors
/// - `NotRegistered`: no merchant record for the identity
/// - `Conflict`: the merchant already holds a passkey
/// - `UpstreamTimeout`: persistence did not answer in time
pub async fn begin_registration(state: &AppState, identity: &str) -> AppResult<CreationOptions> {
    let merchant = bounded(
        state.config.upstream_timeout,
        "merchant lookup",
        state.persistence.find_merchant_by_identity(identity),
    )
    .await?
    .ok_or_else(|| AppError::NotRegistered(identity.to_string()))?;

    ensure_no_passkey(state, identity).await?;

    // The user handle is derived from the identity so login can check it
    let user_handle = identity.as_bytes().to_vec();
    let challenge = generate_challenge();
    let rp = &state.rp;

    let options = CreationOptions {
        challenge: codec::encode_for_transport(&challenge),
        rp: rp.entity(),
        user: UserEntity {
            id: codec::encode_for_transport(&user_handle),
            name: identity.to_string(),
            display_name: merchant.name,
        },
        pub_key_cred_params: vec![
            PublicKeyCredentialParameters::public_key(COSE_ALG_ES256),
            PublicKeyCredentialParameters::public_key(COSE_ALG_RS256),
        ],
        timeout: rp.timeout_ms,
        attestation: "none".to_string(),
        authenticator_selection: AuthenticatorSelection {
            user_verification: rp.user_verification,
            resident_key: "preferred".to_string(),
            require_resident_key: false,
        },
        exclude_credentials: (),
    };

    state.challenges.put(
        identity,
        ChallengeState::new(
            challenge,
            CeremonyParameters {
                ceremony: Ceremony::Registration,
                user_verification: rp.user_verification,
                user_handle,
            },
            state.config.challenge_ttl,
        ),
    );

    tracing::debug!(identity, "registration options issued");
    Ok(options)
}

/// Verify an attestation response and persist the credential
///
/// Step 2 of registration.
///
/// ## Flow
/// 1. Take the pending challenge (gone from here on, even on failure)
/// 2. Read `rawId`, `clientDataJSON`, `attestationObject` and `transports`
/// 3. Check client data: type `webauthn.create`, challenge, origin
/// 4. Parse the attestation object; check rpIdHash and the UP/UV flags
/// 5. Require attested credential data whose id equals `rawId`
/// 6. Parse the COSE key and check the attestation statement
/// 7. Check no passkey landed meanwhile, then insert the record
///
/// ## Parameters
/// - `payload`: the decoded request body, either
///   `{credential: {rawId, response: {clientDataJSON, attestationObject, transports?}}}`
///   or the flat `{rawId, clientDataJSON, attestationObject, transports?}`
///
/// ## Errors
/// - `NoChallenge` / `Expired`: nothing usable pending, call begin again
/// - `MalformedRequest` / `Decode`: missing or undecodable fields
/// - `VerificationFailed`: any check in steps 3 to 6
/// - `Conflict`: the merchant got a passkey through a concurrent ceremony
/// - `UpstreamTimeout` / `Database`: persistence trouble
pub async fn finish_registration(
    state: &AppState,
    identity: &str,
    payload: &Value,
) -> AppResult<CredentialRecord> {
    let result = finish(state, identity, payload).await;
    match &result {
        Ok(record) => tracing::info!(
            identity,
            attestation = %record.attestation_type,
            "passkey registered"
        ),
        Err(e) => tracing::warn!(identity, error = e.code(), "registration failed: {}", e),
    }
    result
}

async fn finish(state: &AppState, identity: &str, payload: &Value) -> AppResult<CredentialRecord> {
    let pending = state.challenges.take(identity)?;
    if pending.parameters.ceremony != Ceremony::Registration {
        return Err(AppError::NoChallenge(identity.to_string()));
    }

    let credential = payload
        .get("credential")
        .filter(|c| c.is_object())
        .unwrap_or(payload);
    let response = credential
        .get("response")
        .filter(|r| r.is_object())
        .unwrap_or(credential);

    let raw_id = codec::required_field(credential, "rawId")?;
    let client_data_json = codec::required_field(response, "clientDataJSON")?;
    let attestation_bytes = codec::required_field(response, "attestationObject")?;
    let transports = read_transports(response).or_else(|| read_transports(credential));

    let rp = &state.rp;
    let client_data = verify::parse_client_data(&client_data_json)?;
    verify::verify_client_data(
        &client_data,
        CLIENT_DATA_CREATE,
        &pending.challenge,
        std::slice::from_ref(&rp.origin),
    )?;

    let attestation = AttestationObject::parse(&attestation_bytes)?;
    let auth_data = &attestation.auth_data;
    verify::verify_rp_id_hash(auth_data, &rp.id)?;
    verify::verify_user_flags(auth_data, pending.parameters.user_verification)?;

    let attested = auth_data.attested_credential.as_ref().ok_or_else(|| {
        AppError::VerificationFailed("authenticator data has no attested credential".to_string())
    })?;
    if attested.credential_id != raw_id {
        return Err(AppError::VerificationFailed(
            "attested credential id does not match rawId".to_string(),
        ));
    }

    let public_key = CosePublicKey::from_cbor(&attested.public_key)?;
    let attestation_type =
        verify::verify_attestation_statement(&attestation, &public_key, &client_data_json)?;

    if auth_data.backup_eligible() {
        tracing::debug!(identity, backed_up = auth_data.backed_up(), "credential is backup eligible");
    }

    let record = CredentialRecord::new(
        identity,
        &raw_id,
        attested.public_key.clone(),
        auth_data.sign_count,
        &transports.unwrap_or_default(),
        attestation_type,
        Uuid::from_bytes(attested.aaguid).to_string(),
    );

    // A concurrent ceremony may have stored a passkey since `begin`; the
    // unique index on `email` catches the window between this check and the insert
    ensure_no_passkey(state, identity).await?;

    bounded(
        state.config.upstream_timeout,
        "credential insert",
        state.persistence.insert_credential_record(&record),
    )
    .await?;

    Ok(record)
}

/// `Conflict` if the merchant already holds a passkey
async fn ensure_no_passkey(state: &AppState, identity: &str) -> AppResult<()> {
    let existing = bounded(
        state.config.upstream_timeout,
        "credential lookup",
        state.persistence.find_credentials_by_identity(identity),
    )
    .await?;

    if existing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "'{identity}' already has a registered passkey"
        )))
    }
}

/// `transports` as a list of strings; anything else is ignored
fn read_transports(object: &Value) -> Option<Vec<String>> {
    let items = object.get("transports")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect(),
    )
}
