//! LemonSqueezy webhook model: signature verification over the raw body
//! and tolerant field access into the order payload.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Verify the `X-Signature` header against the exact bytes received on
/// the wire, before any JSON parsing. Re-serializing and re-comparing
/// would be wrong: re-serialization can change the bytes.
///
/// The header may carry a `sha256=` prefix; hex case is ignored. The
/// comparison runs in constant time over the encoded digests so the
/// position of a mismatch leaks nothing. A length mismatch rejects.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
) -> Result<()> {
    let token = signature_header.trim();
    let token = token.strip_prefix("sha256=").unwrap_or(token).trim();

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Config("webhook secret rejected by HMAC".into()))?;
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    let supplied = token.to_ascii_lowercase();

    let matches =
        expected.len() == supplied.len() && bool::from(expected.as_bytes().ct_eq(supplied.as_bytes()));
    if matches {
        Ok(())
    } else {
        // Safe diagnostics only: lengths and a digest prefix, never the
        // full values.
        tracing::warn!(
            header_len = signature_header.len(),
            token_len = supplied.len(),
            body_len = payload.len(),
            digest_prefix = %&expected[..12],
            "webhook signature mismatch"
        );
        Err(AppError::InvalidSignature)
    }
}

#[derive(Debug, Deserialize)]
pub struct LemonSqueezyWebhookEvent {
    pub meta: LemonSqueezyMeta,
    pub data: LemonSqueezyEventData,
}

#[derive(Debug, Deserialize)]
pub struct LemonSqueezyMeta {
    pub event_name: String,
    #[serde(default)]
    pub custom_data: Option<LemonSqueezyCustomData>,
}

/// Checkout custom data. `product_code` overrides the static product map
/// when present.
#[derive(Debug, Deserialize)]
pub struct LemonSqueezyCustomData {
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LemonSqueezyEventData {
    #[serde(default)]
    pub id: String,
    /// Order attributes stay untyped: the interesting fields have shifted
    /// names across payload versions, so they are read through the
    /// ordered-precedence accessors in [`OrderFields`].
    #[serde(default)]
    pub attributes: Value,
}

/// Fields pulled out of an order-class event, each through a documented
/// precedence chain over the historically varying spellings.
#[derive(Debug, Clone, Default)]
pub struct OrderFields {
    pub order_id: String,
    pub identifier: Option<String>,
    pub order_number: Option<i64>,
    pub external_product_id: Option<String>,
    pub buyer_email: Option<String>,
    pub buyer_name: Option<String>,
    pub customer_id: Option<String>,
    pub product_version: Option<String>,
    pub receipt_url: Option<String>,
}

impl OrderFields {
    pub fn from_event(event: &LemonSqueezyWebhookEvent) -> Self {
        let attrs = &event.data.attributes;
        let first_item = attrs.get("first_order_item");
        let urls = attrs.get("urls");

        // Precedence: first_order_item.product_id, then attributes.product_id
        let external_product_id = string_ish(first_item.and_then(|i| i.get("product_id")))
            .or_else(|| string_ish(attrs.get("product_id")));

        // Precedence: user_email, then customer_email
        let buyer_email = string_ish(attrs.get("user_email"))
            .or_else(|| string_ish(attrs.get("customer_email")));

        // Precedence: user_name, then customer_name (email fallback is the
        // lifecycle engine's call)
        let buyer_name = string_ish(attrs.get("user_name"))
            .or_else(|| string_ish(attrs.get("customer_name")));

        // Precedence: attributes.customer_id, then checkout custom data
        let customer_id = string_ish(attrs.get("customer_id")).or_else(|| {
            event
                .meta
                .custom_data
                .as_ref()
                .and_then(|c| c.customer_id.clone())
        });

        // Precedence: variant_name, then variant_id
        let product_version = string_ish(first_item.and_then(|i| i.get("variant_name")))
            .or_else(|| string_ish(first_item.and_then(|i| i.get("variant_id"))));

        // Precedence: urls.receipt, then urls.invoice_url
        let receipt_url = string_ish(urls.and_then(|u| u.get("receipt")))
            .or_else(|| string_ish(urls.and_then(|u| u.get("invoice_url"))));

        Self {
            order_id: event.data.id.clone(),
            identifier: string_ish(attrs.get("identifier")),
            order_number: attrs.get("order_number").and_then(Value::as_i64),
            external_product_id,
            buyer_email,
            buyer_name,
            customer_id,
            product_version,
            receipt_url,
        }
    }
}

/// Read a value that providers serialize sometimes as a JSON string and
/// sometimes as a number. Empty strings count as absent.
fn string_ish(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
