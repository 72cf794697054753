//! # Middleware Module
//!
//! - `auth`: rejects requests without a valid session token

pub mod auth;
