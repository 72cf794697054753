//! # Health Check Handler

use axum::Json;
use serde_json::{json, Value};

/// GET /health
///
/// Always 200 while the process is up; used by load balancers and monitors.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "merchant-passkey-server"
    }))
}
