//! Clerk backend client: session-token verification against Clerk's JWKS
//! and verified-email lookup through the Backend API.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jwt_simple::prelude::{NoCustomClaims, RS256PublicKey, RSAPublicKeyLike, Token};
use reqwest::Client;
use serde::Deserialize;

use super::{AuthSubject, IdentityProvider};
use crate::error::{AppError, Result};

const CLERK_API_BASE: &str = "https://api.clerk.com";
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    #[serde(default)]
    kty: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct ClerkUser {
    #[serde(default)]
    email_addresses: Vec<ClerkEmailAddress>,
}

#[derive(Debug, Deserialize)]
struct ClerkEmailAddress {
    email_address: String,
    #[serde(default)]
    verification: Option<ClerkVerification>,
}

#[derive(Debug, Deserialize)]
struct ClerkVerification {
    #[serde(default)]
    status: Option<String>,
}

pub struct ClerkClient {
    secret_key: String,
    api_base: String,
    http_client: Client,
    jwks: RwLock<Option<(Instant, Jwks)>>,
}

impl ClerkClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            secret_key,
            api_base: CLERK_API_BASE.to_string(),
            http_client: Client::new(),
            jwks: RwLock::new(None),
        }
    }

    fn cached_jwks(&self) -> Option<Jwks> {
        let slot = self.jwks.read().ok()?;
        let (fetched_at, jwks) = slot.as_ref()?;
        (fetched_at.elapsed() < JWKS_CACHE_TTL).then(|| jwks.clone())
    }

    async fn jwks(&self) -> Result<Jwks> {
        if let Some(jwks) = self.cached_jwks() {
            return Ok(jwks);
        }

        let response = self
            .http_client
            .get(format!("{}/v1/jwks", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Unauthenticated(format!("JWKS fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Unauthenticated(format!(
                "JWKS fetch returned {}",
                response.status()
            )));
        }
        let fetched: Jwks = response
            .json()
            .await
            .map_err(|e| AppError::Unauthenticated(format!("JWKS response malformed: {e}")))?;

        if let Ok(mut slot) = self.jwks.write() {
            *slot = Some((Instant::now(), fetched.clone()));
        }
        Ok(fetched)
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn verify_token(&self, token: &str) -> Result<AuthSubject> {
        let metadata = Token::decode_metadata(token)
            .map_err(|e| AppError::Unauthenticated(format!("malformed token: {e}")))?;
        let kid = metadata
            .key_id()
            .ok_or_else(|| AppError::Unauthenticated("token has no key id".into()))?
            .to_string();

        let jwks = self.jwks().await?;
        let jwk = jwks
            .keys
            .iter()
            .find(|k| k.kid == kid && k.kty == "RSA")
            .ok_or_else(|| AppError::Unauthenticated("token signed by unknown key".into()))?;

        let n = URL_SAFE_NO_PAD
            .decode(jwk.n.as_bytes())
            .map_err(|_| AppError::Unauthenticated("JWKS modulus is not base64url".into()))?;
        let e = URL_SAFE_NO_PAD
            .decode(jwk.e.as_bytes())
            .map_err(|_| AppError::Unauthenticated("JWKS exponent is not base64url".into()))?;
        let key = RS256PublicKey::from_components(&n, &e)
            .map_err(|e| AppError::Unauthenticated(format!("JWKS key rejected: {e}")))?;

        let claims = key
            .verify_token::<NoCustomClaims>(token, None)
            .map_err(|e| AppError::Unauthenticated(format!("token rejected: {e}")))?;

        let user_id = claims
            .subject
            .ok_or_else(|| AppError::Unauthenticated("token has no subject".into()))?;
        Ok(AuthSubject { user_id })
    }

    async fn verified_emails(&self, user_id: &str) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(format!("{}/v1/users/{}", self.api_base, user_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Clerk API error: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Clerk API returned {}",
                response.status()
            )));
        }
        let user: ClerkUser = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("failed to parse Clerk user: {e}")))?;

        Ok(user
            .email_addresses
            .into_iter()
            .filter(|e| {
                e.verification.as_ref().and_then(|v| v.status.as_deref()) == Some("verified")
            })
            .map(|e| e.email_address)
            .collect())
    }
}
