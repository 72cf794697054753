//! Outbound mail. Delivery itself belongs to an external SMTP relay; the
//! default mailer only logs the link so development setups need no relay.

use crate::error::AppResult;
use async_trait::async_trait;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_magic_link(&self, to: &str, link: &str) -> AppResult<()>;
}

#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_magic_link(&self, to: &str, link: &str) -> AppResult<()> {
        tracing::info!(to, link, "magic link issued");
        Ok(())
    }
}
