//! # Passkey Ceremony Handlers
//!
//! Thin wrappers that pull the identity out of the request, run the ceremony
//! and shape the response.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::upstream::bounded;
use crate::webauthn::codec;
use crate::webauthn::types::{
    BeginRequest, CreationOptions, LoginCompleteRequest, LoginResponse, RequestOptions,
};
use crate::webauthn::{authentication, registration};
use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// POST /register/begin
pub async fn register_begin(
    State(state): State<AppState>,
    Json(req): Json<BeginRequest>,
) -> AppResult<Json<CreationOptions>> {
    let identity = require_email(&req.email)?;
    let options = registration::begin_registration(&state, identity).await?;
    Ok(Json(options))
}

/// POST /register/finish
///
/// Accepts JSON or CBOR; the body carries `email` next to the credential.
pub async fn register_finish(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let payload = codec::decode_body(content_type, &body)?;

    let identity = payload
        .get("email")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::MalformedRequest("missing field 'email'".to_string()))?;
    let identity = require_email(identity)?;

    registration::finish_registration(&state, identity, &payload).await?;

    Ok(Json(json!({ "msg": "Passkey registered" })))
}

/// POST /login/begin
pub async fn login_begin(
    State(state): State<AppState>,
    Json(req): Json<BeginRequest>,
) -> AppResult<Json<RequestOptions>> {
    let identity = require_email(&req.email)?;
    let options = authentication::begin_authentication(&state, identity).await?;
    Ok(Json(options))
}

/// POST /login/complete
pub async fn login_complete(
    State(state): State<AppState>,
    Json(req): Json<LoginCompleteRequest>,
) -> AppResult<Json<LoginResponse>> {
    let identity = require_email(&req.email)?;
    authentication::complete_authentication(&state, identity, &req.assertion).await?;

    let token = bounded(
        state.config.upstream_timeout,
        "session issuance",
        state.sessions.issue_session_token(identity),
    )
    .await?;

    Ok(Json(LoginResponse {
        status: "logged_in".to_string(),
        token,
    }))
}

fn require_email(email: &str) -> AppResult<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::MalformedRequest("email is required".to_string()));
    }
    Ok(email)
}
