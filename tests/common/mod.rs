//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use r2d2_sqlite::SqliteConnectionManager;
use tempfile::TempDir;
use tower::ServiceExt;

use feddsp_licensing::config::Config;
use feddsp_licensing::db::{self, AppState, DbPool};
use feddsp_licensing::email::EmailService;
use feddsp_licensing::error::{AppError, Result};
use feddsp_licensing::handlers;
use feddsp_licensing::identity::{AuthSubject, IdentityProvider};
use feddsp_licensing::models::{
    Envelope, LicensePayload, LicenseRecord, LicenseStatus, RECORD_SCHEMA_VERSION,
};
use feddsp_licensing::signing::{self, LicenseSigner};

pub const TEST_WEBHOOK_SECRET: &str = "ls_whsec_test_secret";
pub const TEST_ADMIN_KEY: &str = "admin_test_key";
pub const STUB_USER_ID: &str = "user_u1";
pub const STUB_TOKEN: &str = "stub-session-token";

/// Fixed test seed; base64 of 32 bytes, the rawest key format the loader
/// accepts.
pub fn test_signing_key() -> String {
    STANDARD.encode([7u8; 32])
}

pub fn test_signer() -> LicenseSigner {
    LicenseSigner::from_config(&test_signing_key()).expect("test signing key loads")
}

pub fn test_config() -> Config {
    let mut product_map = HashMap::new();
    product_map.insert("636851".to_string(), "fedDSP-PHAT".to_string());
    product_map.insert("738772".to_string(), "fedDSP-FIERY".to_string());
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: String::new(),
        webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
        signing_key: Some(test_signing_key()),
        admin_api_key: Some(TEST_ADMIN_KEY.to_string()),
        clerk_secret_key: None,
        postmark_api_key: None,
        mail_from: None,
        support_email: None,
        product_map,
    }
}

/// Identity provider stub: one fixed subject, a mutable verified-email
/// set, and a switch to simulate the email lookup being unavailable.
#[derive(Default)]
pub struct StubIdentity {
    pub emails: Mutex<Vec<String>>,
    pub fail_emails: Mutex<bool>,
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn verify_token(&self, token: &str) -> Result<AuthSubject> {
        if token == STUB_TOKEN {
            Ok(AuthSubject {
                user_id: STUB_USER_ID.to_string(),
            })
        } else {
            Err(AppError::Unauthenticated("unknown token".into()))
        }
    }

    async fn verified_emails(&self, _user_id: &str) -> Result<Vec<String>> {
        if *self.fail_emails.lock().unwrap() {
            return Err(AppError::Internal("email lookup unavailable".into()));
        }
        Ok(self.emails.lock().unwrap().clone())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub identity: Arc<StubIdentity>,
    _tmp: TempDir,
}

/// Fresh app state over a temp SQLite file. The pool is capped at one
/// connection so a test can flip PRAGMAs (e.g. `query_only`) that must
/// be visible to every later request.
pub fn test_app() -> TestApp {
    let tmp = TempDir::new().expect("temp dir");
    let db_path = tmp.path().join("test.db");
    let manager = SqliteConnectionManager::file(&db_path);
    let pool: DbPool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("pool");
    db::init_schema(&pool.get().expect("conn")).expect("schema");

    let config = test_config();
    let signer = Some(Arc::new(test_signer()));
    let email = Arc::new(EmailService::from_config(&config));
    let identity = Arc::new(StubIdentity::default());

    let state = AppState {
        db: pool,
        config: Arc::new(config),
        signer,
        email,
        identity: Some(identity.clone() as Arc<dyn IdentityProvider>),
    };

    TestApp {
        state,
        identity,
        _tmp: tmp,
    }
}

pub fn app(state: AppState) -> Router {
    handlers::router().with_state(state)
}

// ============ Webhook helpers ============

pub fn sign_body(body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(TEST_WEBHOOK_SECRET.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub fn order_created_body(order_id: &str, product_id: &str, email: &str, name: &str) -> Vec<u8> {
    serde_json::json!({
        "meta": { "event_name": "order_created" },
        "data": {
            "id": order_id,
            "attributes": {
                "identifier": format!("{order_id}-IDENT"),
                "order_number": 1042,
                "user_email": email,
                "user_name": name,
                "customer_id": 4242,
                "urls": { "receipt": "https://pay.example/receipt/1" },
                "first_order_item": { "product_id": product_id, "variant_name": "v1.2" }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn order_refunded_body(order_id: &str, product_id: &str) -> Vec<u8> {
    serde_json::json!({
        "meta": { "event_name": "order_refunded" },
        "data": {
            "id": order_id,
            "attributes": {
                "first_order_item": { "product_id": product_id }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub async fn post_webhook_signed(state: AppState, body: Vec<u8>) -> Response {
    let signature = sign_body(&body);
    post_webhook(state, body, &signature).await
}

pub async fn post_webhook(state: AppState, body: Vec<u8>, signature: &str) -> Response {
    app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/lemonsqueezy")
                .header("x-signature", signature)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn get_purchases(state: AppState, token: Option<&str>) -> Response {
    let mut builder = Request::builder().method("GET").uri("/account/purchases");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    app(state)
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

// ============ Record fixtures ============

/// A fully-formed, genuinely signed license record for seeding the store
/// directly.
pub fn make_license_record(
    order_id: &str,
    external_product_id: &str,
    email: &str,
    customer_id: Option<&str>,
    created_at: &str,
) -> LicenseRecord {
    let signer = test_signer();
    let payload = LicensePayload {
        license_to: "Test Buyer".to_string(),
        email: email.to_string(),
        product_id: "fedDSP-PHAT".to_string(),
        license_id: format!("LS-{order_id}"),
        issued_at: created_at.to_string(),
        version: "1".to_string(),
    };
    let envelope: Envelope = signer.sign_payload(&payload).expect("sign");
    let license_artifact = signing::render_artifact(&envelope).expect("render");

    LicenseRecord {
        schema_version: RECORD_SCHEMA_VERSION,
        status: LicenseStatus::Active,
        revoked_at: None,
        revocation_event_id: None,
        license_id: payload.license_id.clone(),
        license_artifact,
        envelope,
        order_id: order_id.to_string(),
        order_identifier: None,
        order_number: Some(1042),
        external_product_id: external_product_id.to_string(),
        product_code: "fedDSP-PHAT".to_string(),
        product_version: None,
        customer_id: customer_id.map(str::to_string),
        buyer_email: email.to_string(),
        buyer_name: "Test Buyer".to_string(),
        receipt_url: None,
        issued_at: created_at.to_string(),
        created_at: created_at.to_string(),
    }
}
