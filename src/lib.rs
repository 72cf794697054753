//! # Merchant Passkey Server
//!
//! Passwordless (WebAuthn passkey) sign-in for the merchants of a crypto
//! invoicing service. Merchants onboard through a magic link, register one
//! passkey and log in with it to obtain a JWT session token.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod middleware;
pub mod session;
pub mod state;
pub mod upstream;
pub mod webauthn;

use crate::handlers::{auth, health, merchants, onboarding};
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .rp
        .login_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let protected_routes = Router::new()
        .route("/api/merchants/me", get(merchants::get_current_merchant))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        // Onboarding
        .route("/send-magic-link", post(onboarding::send_magic_link))
        .route("/register/:token", get(onboarding::register_with_token))
        // Passkey registration
        .route("/register/begin", post(auth::register_begin))
        .route("/register/finish", post(auth::register_finish))
        // Passkey login
        .route("/login/begin", post(auth::login_begin))
        .route("/login/complete", post(auth::login_complete))
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Drop expired challenges every `period`
pub fn spawn_challenge_purge(state: &AppState, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
    let challenges = state.challenges.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = challenges.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired challenges purged");
            }
        }
    })
}
