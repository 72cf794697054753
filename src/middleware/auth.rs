use crate::error::AppError;
use crate::state::AppState;
use crate::upstream::bounded;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

/// Require a valid `Authorization: Bearer <session token>`
///
/// The decoded [`SessionClaims`](crate::session::SessionClaims) are put in the
/// request extensions for handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    let claims = bounded(
        state.config.upstream_timeout,
        "session verification",
        state.sessions.verify_session_token(&token),
    )
    .await?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
