//! # Session and Magic-Link Tokens
//!
//! Both are HS256 JWTs signed with `JWT_SECRET`:
//!
//! - session tokens carry `{email, iat, exp}` and are handed out by
//!   `POST /login/complete`;
//! - magic-link tokens carry the merchant's company details and are mailed
//!   during onboarding.

use crate::db::models::MerchantProfile;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicLinkClaims {
    #[serde(flatten)]
    pub profile: MerchantProfile,
    pub exp: i64,
}

/// Issues and checks session tokens
///
/// Treated as an external collaborator: issuance failures surface as
/// `Upstream`, a bad token as `Unauthorized`.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn issue_session_token(&self, identity: &str) -> AppResult<String>;

    async fn verify_session_token(&self, token: &str) -> AppResult<SessionClaims>;
}

pub struct JwtSessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtSessionIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Signs and opens onboarding links
pub struct MagicLinks {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl MagicLinks {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, profile: &MerchantProfile) -> AppResult<String> {
        let claims = MagicLinkClaims {
            profile: profile.clone(),
            exp: expiry(self.ttl),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("could not sign magic link: {e}")))
    }

    pub fn verify(&self, token: &str) -> AppResult<MerchantProfile> {
        decode::<MagicLinkClaims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims.profile)
            .map_err(|e| AppError::Unauthorized(format!("invalid or expired link: {e}")))
    }
}

#[async_trait]
impl SessionIssuer for JwtSessionIssuer {
    async fn issue_session_token(&self, identity: &str) -> AppResult<String> {
        let claims = SessionClaims {
            email: identity.to_string(),
            iat: Utc::now().timestamp(),
            exp: expiry(self.ttl),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Upstream(format!("session issuer could not sign token: {e}")))
    }

    async fn verify_session_token(&self, token: &str) -> AppResult<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("invalid session token: {e}")))
    }
}

fn expiry(ttl: Duration) -> i64 {
    Utc::now().timestamp() + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> JwtSessionIssuer {
        JwtSessionIssuer::new("test-secret", Duration::from_secs(3600))
    }

    fn links() -> MagicLinks {
        MagicLinks::new("test-secret", Duration::from_secs(900))
    }

    fn profile() -> MerchantProfile {
        MerchantProfile {
            name: "Acme".into(),
            country: "PRT".into(),
            city: "Lisbon".into(),
            postal_code: "1000-001".into(),
            address: "Rua Augusta 1".into(),
            email: "a@x.com".into(),
            tax_number: "PT123".into(),
        }
    }

    #[tokio::test]
    async fn session_tokens_verify_with_the_same_secret() {
        let issuer = issuer();
        let token = issuer.issue_session_token("a@x.com").await.unwrap();
        let claims = issuer.verify_session_token(&token).await.unwrap();
        assert_eq!(claims.email, "a@x.com");
        assert!(claims.exp > claims.iat);

        let other = JwtSessionIssuer::new("other", Duration::from_secs(60));
        assert!(matches!(
            other.verify_session_token(&token).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn magic_link_carries_the_profile() {
        let links = links();
        let token = links.issue(&profile()).unwrap();
        assert_eq!(links.verify(&token).unwrap(), profile());
        assert!(links.verify("garbage").is_err());
    }

    #[test]
    fn expired_magic_links_are_rejected() {
        let claims = MagicLinkClaims {
            profile: profile(),
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(
            links().verify(&token),
            Err(AppError::Unauthorized(_))
        ));
    }
}
