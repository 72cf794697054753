//! # HTTP Request Handlers
//!
//! - `health`: liveness check
//! - `auth`: passkey registration and login ceremonies
//! - `onboarding`: magic-link merchant sign-up
//! - `merchants`: the logged-in merchant's profile
//!
//! Handlers extract the request, call into `webauthn` / `db`, and return
//! `AppResult<...>` so failures render through `AppError`'s `IntoResponse`.

pub mod auth;
pub mod health;
pub mod merchants;
pub mod onboarding;
