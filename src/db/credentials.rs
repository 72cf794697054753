//! # Credential Database Operations
//!
//! Only public keys are stored; private keys never leave the authenticator.

use crate::db::models::CredentialRecord;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sqlx::SqlitePool;

/// Insert a credential created by a successful registration
///
/// A duplicate credential id, or a second credential for the same merchant,
/// is reported as `Conflict`.
pub async fn insert(pool: &SqlitePool, record: &CredentialRecord) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO credentials
         (id, email, credential_id, public_key, sign_count, transports, attestation_type, aaguid, created_at, last_used_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.email)
    .bind(&record.credential_id)
    .bind(&record.public_key)
    .bind(record.sign_count)
    .bind(&record.transports)
    .bind(&record.attestation_type)
    .bind(&record.aaguid)
    .bind(&record.created_at)
    .bind(&record.last_used_at)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Conflict(format!("'{}' already has a registered passkey", record.email))
        }
        _ => AppError::Database(e),
    })?;

    Ok(())
}

/// All credentials of a merchant, oldest first; empty when none exist
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Vec<CredentialRecord>> {
    let records = sqlx::query_as::<_, CredentialRecord>(
        "SELECT * FROM credentials WHERE email = ? ORDER BY created_at",
    )
    .bind(email)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Store the counter reported by the last assertion and stamp `last_used_at`
pub async fn update_sign_count(pool: &SqlitePool, id: &str, sign_count: u32) -> AppResult<()> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query("UPDATE credentials SET sign_count = ?, last_used_at = ? WHERE id = ?")
        .bind(i64::from(sign_count))
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("credential row '{id}'")));
    }
    Ok(())
}
