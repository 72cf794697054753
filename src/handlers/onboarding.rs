//! # Merchant Onboarding
//!
//! A merchant submits company details, receives a signed link by mail and,
//! by following it, gets a merchant record and lands on the frontend's
//! passkey setup page.

use crate::db::models::{Merchant, MerchantProfile};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::upstream::bounded;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Whether the identity has a merchant record and a passkey
async fn registration_status(state: &AppState, email: &str) -> AppResult<(bool, bool)> {
    let limit = state.config.upstream_timeout;
    let merchant = bounded(
        limit,
        "merchant lookup",
        state.persistence.find_merchant_by_identity(email),
    )
    .await?;
    let credentials = bounded(
        limit,
        "credential lookup",
        state.persistence.find_credentials_by_identity(email),
    )
    .await?;
    Ok((merchant.is_some(), !credentials.is_empty()))
}

/// POST /send-magic-link
pub async fn send_magic_link(
    State(state): State<AppState>,
    Json(profile): Json<MerchantProfile>,
) -> AppResult<Json<Value>> {
    // Stored and signed in the same trimmed form `/register/begin` looks up
    let profile = profile.normalized();
    if profile.email.is_empty() {
        return Err(AppError::MalformedRequest("email is required".to_string()));
    }

    let (merchant_exists, has_passkey) = registration_status(&state, &profile.email).await?;
    if merchant_exists && has_passkey {
        return Ok(Json(json!({
            "msg": "This email is already registered. You can log in directly."
        })));
    }

    let token = state.magic_links.issue(&profile)?;
    let link = format!("{}{}", state.config.magic_link_base_url, token);

    let sent = bounded(
        state.config.upstream_timeout,
        "mailer",
        state.mailer.send_magic_link(&profile.email, &link),
    )
    .await;
    if let Err(e) = sent {
        tracing::error!(email = %profile.email, "sending magic link failed: {}", e);
        return Ok(Json(json!({ "msg": "Error sending email, try again." })));
    }

    let msg = if merchant_exists {
        "Magic link sent. Complete your passkey setup."
    } else {
        "Magic link sent."
    };
    Ok(Json(json!({ "msg": msg })))
}

/// GET /register/:token
pub async fn register_with_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Response> {
    let profile = state.magic_links.verify(&token)?.normalized();
    let email = profile.email.clone();

    let (merchant_exists, has_passkey) = registration_status(&state, &email).await?;
    if merchant_exists && has_passkey {
        return Ok(Json(json!({ "msg": "Already registered. You can log in now." })).into_response());
    }

    if !merchant_exists {
        let merchant = Merchant::new(profile);
        bounded(
            state.config.upstream_timeout,
            "merchant insert",
            state.persistence.insert_merchant(&merchant),
        )
        .await?;
        tracing::info!(email = %email, "merchant created from magic link");
    }

    let setup_url = format!("{}/setup-passkey", state.config.frontend_url.trim_end_matches('/'));
    let location = url::Url::parse_with_params(&setup_url, &[("email", email.as_str())])
        .map_err(|e| AppError::Internal(format!("invalid FRONTEND_URL: {e}")))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response())
}
