//! # Merchant Handlers

use crate::error::{AppError, AppResult};
use crate::session::SessionClaims;
use crate::state::AppState;
use crate::upstream::bounded;
use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

/// Profile of the logged-in merchant
///
/// ## Route
/// GET /api/merchants/me (behind `require_auth`)
///
/// The response lists the merchant's passkeys without key material.
pub async fn get_current_merchant(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> AppResult<Json<Value>> {
    let limit = state.config.upstream_timeout;
    let merchant = bounded(
        limit,
        "merchant lookup",
        state.persistence.find_merchant_by_identity(&claims.email),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("merchant '{}'", claims.email)))?;

    let credentials = bounded(
        limit,
        "credential lookup",
        state.persistence.find_credentials_by_identity(&claims.email),
    )
    .await?;

    let passkeys: Vec<Value> = credentials
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "transports": c.transports(),
                "attestation_type": c.attestation_type,
                "aaguid": c.aaguid,
                "created_at": c.created_at,
                "last_used_at": c.last_used_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "merchant": merchant,
        "passkeys": passkeys,
    })))
}
