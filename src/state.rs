//! # Application State
//!
//! Shared by every request handler. Axum clones it per request, which only
//! copies `Arc` pointers.
//!
//! Collaborators sit behind traits (`Persistence`, `ChallengeStore`,
//! `SessionIssuer`, `Mailer`) so tests can swap any of them.

use crate::config::Config;
use crate::db::{Database, Persistence};
use crate::mail::{LogMailer, Mailer};
use crate::session::{JwtSessionIssuer, MagicLinks, SessionIssuer};
use crate::webauthn::challenge_store::{ChallengeStore, InMemoryChallengeStore};
use crate::webauthn::RelyingParty;
use anyhow::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rp: Arc<RelyingParty>,
    pub persistence: Arc<dyn Persistence>,
    /// Pending ceremonies; lost on restart
    pub challenges: Arc<dyn ChallengeStore>,
    pub sessions: Arc<dyn SessionIssuer>,
    pub magic_links: Arc<MagicLinks>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Connect to the database (running migrations) and wire the defaults
    pub async fn new(config: Config) -> Result<Self> {
        let db = Database::connect(&config.database_url, config.database_max_connections).await?;
        Ok(Self::with_persistence(config, Arc::new(db)))
    }

    /// Default collaborators around a given persistence layer
    pub fn with_persistence(config: Config, persistence: Arc<dyn Persistence>) -> Self {
        let rp = RelyingParty::from_config(&config);
        let sessions = JwtSessionIssuer::new(&config.jwt_secret, config.jwt_expiration);
        let magic_links = MagicLinks::new(&config.jwt_secret, config.magic_link_expiration);

        Self {
            rp: Arc::new(rp),
            persistence,
            challenges: Arc::new(InMemoryChallengeStore::new()),
            sessions: Arc::new(sessions),
            magic_links: Arc::new(magic_links),
            mailer: Arc::new(LogMailer),
            config: Arc::new(config),
        }
    }
}
