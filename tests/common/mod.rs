#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::prelude::{BASE64_STANDARD, BASE64_URL_SAFE_NO_PAD};
use base64::Engine;
use ciborium::value::Value as Cbor;
use http_body_util::BodyExt;
use merchant_passkey::config::Config;
use merchant_passkey::db::models::{CredentialRecord, Merchant, MerchantProfile};
use merchant_passkey::db::{Database, Persistence};
use merchant_passkey::error::AppResult;
use merchant_passkey::state::AppState;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const ORIGIN: &str = "http://localhost:3000";
pub const RP_ID: &str = "localhost";
pub const EMAIL: &str = "shop@example.com";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    /// The database under `state.persistence`, for direct inspection
    pub db: Arc<Database>,
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        database_max_connections: 1,
        jwt_secret: "integration-secret".to_string(),
        ..Config::default()
    }
}

pub async fn memory_db() -> Arc<Database> {
    Arc::new(Database::connect("sqlite::memory:", 1).await.unwrap())
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), plain).await
}

/// Use the database as is
pub fn plain(db: Arc<Database>) -> Arc<dyn Persistence> {
    db
}

/// Put `delay` in front of every database call
pub fn slow(delay: Duration) -> impl FnOnce(Arc<Database>) -> Arc<dyn Persistence> {
    move |inner: Arc<Database>| -> Arc<dyn Persistence> { Arc::new(SlowPersistence { inner, delay }) }
}

/// Delay only credential inserts, leaving lookups fast
pub fn slow_inserts(delay: Duration) -> impl FnOnce(Arc<Database>) -> Arc<dyn Persistence> {
    move |inner: Arc<Database>| -> Arc<dyn Persistence> {
        Arc::new(SlowInsertPersistence { inner, delay })
    }
}

/// Build the app over a fresh database, optionally wrapped by `wrap`
pub async fn spawn_app_with<F>(config: Config, wrap: F) -> TestApp
where
    F: FnOnce(Arc<Database>) -> Arc<dyn Persistence>,
{
    let db = memory_db().await;
    let state = AppState::with_persistence(config, wrap(db.clone()));
    let router = merchant_passkey::app(state.clone());
    TestApp { state, router, db }
}

pub fn profile(email: &str) -> MerchantProfile {
    MerchantProfile {
        name: "Acme Coffee".into(),
        country: "PRT".into(),
        city: "Lisbon".into(),
        postal_code: "1100-148".into(),
        address: "Rua Augusta 10".into(),
        email: email.into(),
        tax_number: "PT501234567".into(),
    }
}

impl TestApp {
    pub async fn seed_merchant(&self, email: &str) {
        self.state
            .persistence
            .insert_merchant(&Merchant::new(profile(email)))
            .await
            .unwrap();
    }

    pub async fn credentials(&self, email: &str) -> Vec<CredentialRecord> {
        self.state
            .persistence
            .find_credentials_by_identity(email)
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, body)
    }

    pub async fn post_cbor(&self, uri: &str, body: &Cbor) -> (StatusCode, Value) {
        let mut bytes = Vec::new();
        ciborium::into_writer(body, &mut bytes).unwrap();
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/cbor")
            .body(Body::from(bytes))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, body)
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::get(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Onboard `email` and register `authenticator` for it
    pub async fn register(&self, email: &str, authenticator: &mut SoftAuthenticator) {
        self.seed_merchant(email).await;
        let (status, options) = self.post_json("/register/begin", json!({ "email": email })).await;
        assert_eq!(status, StatusCode::OK, "{options}");

        let mut body = authenticator.attest(&options, ORIGIN);
        body["email"] = json!(email);
        let (status, ack) = self.post_json("/register/finish", body).await;
        assert_eq!(status, StatusCode::OK, "{ack}");
    }

    /// Consume the pending ceremony for `email`, reporting whether one existed
    pub fn take_pending(&self, email: &str) -> bool {
        self.state.challenges.take(email).is_ok()
    }

    pub async fn login_options(&self, email: &str) -> Value {
        let (status, options) = self.post_json("/login/begin", json!({ "email": email })).await;
        assert_eq!(status, StatusCode::OK, "{options}");
        options
    }
}

/// A platform authenticator in software: one P-256 credential
pub struct SoftAuthenticator {
    pub signing_key: SigningKey,
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
    pub rp_id: String,
    pub flags: u8,
    pub packed_self_attestation: bool,
    /// `user.id` from the creation options, echoed back at login
    pub user_handle: Vec<u8>,
}

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
const FLAG_AT: u8 = 0x40;

impl SoftAuthenticator {
    pub fn new() -> Self {
        let mut credential_id = vec![0u8; 16];
        OsRng.fill_bytes(&mut credential_id);
        Self {
            signing_key: SigningKey::random(&mut OsRng),
            credential_id,
            sign_count: 0,
            rp_id: RP_ID.to_string(),
            flags: FLAG_UP | FLAG_UV,
            packed_self_attestation: false,
            user_handle: Vec::new(),
        }
    }

    pub fn cose_key(&self) -> Vec<u8> {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let map = Cbor::Map(vec![
            (Cbor::Integer(1i64.into()), Cbor::Integer(2i64.into())),
            (Cbor::Integer(3i64.into()), Cbor::Integer((-7i64).into())),
            (Cbor::Integer((-1i64).into()), Cbor::Integer(1i64.into())),
            (Cbor::Integer((-2i64).into()), Cbor::Bytes(point.x().unwrap().to_vec())),
            (Cbor::Integer((-3i64).into()), Cbor::Bytes(point.y().unwrap().to_vec())),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).unwrap();
        buf
    }

    fn auth_data_prefix(&self, flags: u8) -> Vec<u8> {
        let mut data = Sha256::digest(self.rp_id.as_bytes()).to_vec();
        data.push(flags);
        data.extend_from_slice(&self.sign_count.to_be_bytes());
        data
    }

    pub fn registration_auth_data(&self) -> Vec<u8> {
        let mut data = self.auth_data_prefix(self.flags | FLAG_AT);
        data.extend_from_slice(&[0x11; 16]);
        data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        data.extend_from_slice(&self.credential_id);
        data.extend_from_slice(&self.cose_key());
        data
    }

    pub fn client_data(kind: &str, challenge: &str, origin: &str) -> Vec<u8> {
        json!({
            "type": kind,
            "challenge": challenge,
            "origin": origin,
            "crossOrigin": false
        })
        .to_string()
        .into_bytes()
    }

    fn sign(&self, auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
        let mut message = auth_data.to_vec();
        message.extend_from_slice(&Sha256::digest(client_data_json));
        let signature: Signature = self.signing_key.sign(&message);
        signature.to_der().as_bytes().to_vec()
    }

    pub fn attestation_object(&self, client_data_json: &[u8]) -> Vec<u8> {
        let auth_data = self.registration_auth_data();
        let (fmt, stmt) = if self.packed_self_attestation {
            let sig = self.sign(&auth_data, client_data_json);
            (
                "packed",
                vec![
                    (Cbor::Text("alg".into()), Cbor::Integer((-7i64).into())),
                    (Cbor::Text("sig".into()), Cbor::Bytes(sig)),
                ],
            )
        } else {
            ("none", vec![])
        };
        let object = Cbor::Map(vec![
            (Cbor::Text("fmt".into()), Cbor::Text(fmt.into())),
            (Cbor::Text("attStmt".into()), Cbor::Map(stmt)),
            (Cbor::Text("authData".into()), Cbor::Bytes(auth_data)),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&object, &mut buf).unwrap();
        buf
    }

    /// Wrapped registration payload for creation `options`
    pub fn attest(&mut self, options: &Value, origin: &str) -> Value {
        let challenge = options["challenge"].as_str().unwrap();
        if let Some(user_id) = options["user"]["id"].as_str() {
            self.user_handle = BASE64_URL_SAFE_NO_PAD.decode(user_id).unwrap();
        }
        let client_data = Self::client_data("webauthn.create", challenge, origin);
        let attestation = self.attestation_object(&client_data);
        json!({
            "credential": {
                "id": BASE64_URL_SAFE_NO_PAD.encode(&self.credential_id),
                "rawId": BASE64_URL_SAFE_NO_PAD.encode(&self.credential_id),
                "type": "public-key",
                "response": {
                    "clientDataJSON": BASE64_URL_SAFE_NO_PAD.encode(&client_data),
                    "attestationObject": BASE64_STANDARD.encode(&attestation),
                    "transports": ["internal", "hybrid"]
                }
            }
        })
    }

    /// Sign a login challenge, advancing the counter
    pub fn assert(&mut self, options: &Value, origin: &str) -> Value {
        let challenge = options["challenge"].as_str().unwrap();
        self.sign_count += 1;
        let client_data = Self::client_data("webauthn.get", challenge, origin);
        let auth_data = self.auth_data_prefix(self.flags);
        let signature = self.sign(&auth_data, &client_data);
        json!({
            "id": BASE64_URL_SAFE_NO_PAD.encode(&self.credential_id),
            "rawId": BASE64_URL_SAFE_NO_PAD.encode(&self.credential_id),
            "type": "public-key",
            "response": {
                "clientDataJSON": BASE64_URL_SAFE_NO_PAD.encode(&client_data),
                "authenticatorData": BASE64_URL_SAFE_NO_PAD.encode(&auth_data),
                "signature": BASE64_URL_SAFE_NO_PAD.encode(&signature),
                "userHandle": BASE64_URL_SAFE_NO_PAD.encode(&self.user_handle)
            }
        })
    }
}

/// Persistence that answers after `delay`
pub struct SlowPersistence {
    pub inner: Arc<Database>,
    pub delay: Duration,
}

#[async_trait]
impl Persistence for SlowPersistence {
    async fn find_credentials_by_identity(&self, identity: &str) -> AppResult<Vec<CredentialRecord>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_credentials_by_identity(identity).await
    }

    async fn insert_credential_record(&self, record: &CredentialRecord) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_credential_record(record).await
    }

    async fn update_sign_count(&self, id: &str, sign_count: u32) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.update_sign_count(id, sign_count).await
    }

    async fn find_merchant_by_identity(&self, identity: &str) -> AppResult<Option<Merchant>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_merchant_by_identity(identity).await
    }

    async fn insert_merchant(&self, merchant: &Merchant) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_merchant(merchant).await
    }
}

/// Persistence whose credential inserts land after `delay`
pub struct SlowInsertPersistence {
    pub inner: Arc<Database>,
    pub delay: Duration,
}

#[async_trait]
impl Persistence for SlowInsertPersistence {
    async fn find_credentials_by_identity(&self, identity: &str) -> AppResult<Vec<CredentialRecord>> {
        self.inner.find_credentials_by_identity(identity).await
    }

    async fn insert_credential_record(&self, record: &CredentialRecord) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_credential_record(record).await
    }

    async fn update_sign_count(&self, id: &str, sign_count: u32) -> AppResult<()> {
        self.inner.update_sign_count(id, sign_count).await
    }

    async fn find_merchant_by_identity(&self, identity: &str) -> AppResult<Option<Merchant>> {
        self.inner.find_merchant_by_identity(identity).await
    }

    async fn insert_merchant(&self, merchant: &Merchant) -> AppResult<()> {
        self.inner.insert_merchant(merchant).await
    }
}
