use crate::db::models::Merchant;
use crate::error::{AppError, AppResult};
use sqlx::SqlitePool;

pub async fn insert(pool: &SqlitePool, merchant: &Merchant) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO merchants
         (id, email, name, country_alpha_3, city, postal_code, address, tax_number, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&merchant.id)
    .bind(&merchant.email)
    .bind(&merchant.name)
    .bind(&merchant.country_alpha_3)
    .bind(&merchant.city)
    .bind(&merchant.postal_code)
    .bind(&merchant.address)
    .bind(&merchant.tax_number)
    .bind(&merchant.created_at)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Conflict(format!("merchant '{}' already exists", merchant.email))
        }
        _ => AppError::Database(e),
    })?;

    Ok(())
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<Merchant>> {
    let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(merchant)
}
