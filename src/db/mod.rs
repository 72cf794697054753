//! # Database Module
//!
//! - `models`: row types (`Merchant`, `CredentialRecord`)
//! - `merchants`, `credentials`: queries, one module per table
//!
//! Ceremonies never touch the pool directly. They go through the
//! [`Persistence`] trait so tests can substitute slow or failing stores.

pub mod credentials;
pub mod merchants;
pub mod models;

use crate::error::AppResult;
use async_trait::async_trait;
use models::{CredentialRecord, Merchant};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn find_credentials_by_identity(&self, identity: &str) -> AppResult<Vec<CredentialRecord>>;

    async fn insert_credential_record(&self, record: &CredentialRecord) -> AppResult<()>;

    /// Record a new counter for the row with primary key `id`
    async fn update_sign_count(&self, id: &str, sign_count: u32) -> AppResult<()>;

    async fn find_merchant_by_identity(&self, identity: &str) -> AppResult<Option<Merchant>>;

    async fn insert_merchant(&self, merchant: &Merchant) -> AppResult<()>;
}

/// SQLite-backed [`Persistence`]
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the pool and run the embedded migrations
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for Database {
    async fn find_credentials_by_identity(&self, identity: &str) -> AppResult<Vec<CredentialRecord>> {
        credentials::find_by_email(&self.pool, identity).await
    }

    async fn insert_credential_record(&self, record: &CredentialRecord) -> AppResult<()> {
        credentials::insert(&self.pool, record).await
    }

    async fn update_sign_count(&self, id: &str, sign_count: u32) -> AppResult<()> {
        credentials::update_sign_count(&self.pool, id, sign_count).await
    }

    async fn find_merchant_by_identity(&self, identity: &str) -> AppResult<Option<Merchant>> {
        merchants::find_by_email(&self.pool, identity).await
    }

    async fn insert_merchant(&self, merchant: &Merchant) -> AppResult<()> {
        merchants::insert(&self.pool, merchant).await
    }
}
