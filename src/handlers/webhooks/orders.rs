//! The license lifecycle decisions: issue on `order_created`, revoke on
//! `order_refunded`. Both are idempotent under the provider's
//! at-least-once delivery.

use axum::http::StatusCode;

use crate::config::Config;
use crate::db::{self, AppState};
use crate::models::{LicensePayload, LicenseRecord, LicenseStatus, RECORD_SCHEMA_VERSION};
use crate::payments::{LemonSqueezyWebhookEvent, OrderFields};
use crate::signing;
use crate::tasks;
use crate::util::now_iso;

/// Issue a license for an `order_created` event.
///
/// Permanently unmappable orders (no buyer email, no product mapping)
/// answer 200 so the provider stops retrying them. A persistence failure
/// answers 500: that is the retry-until-success path, and success is
/// never reported before the License Store write is confirmed.
pub async fn process_order_created(
    state: AppState,
    event: &LemonSqueezyWebhookEvent,
) -> (StatusCode, &'static str) {
    let fields = OrderFields::from_event(event);

    if fields.order_id.is_empty() {
        tracing::error!("order event carries no order id, cannot key a license");
        return (StatusCode::OK, "OK (no order id, no license issued)");
    }

    let Some(buyer_email) = fields.buyer_email.clone() else {
        tracing::error!(order_id = %fields.order_id, "missing buyer email, cannot issue license");
        return (StatusCode::OK, "OK (no email, no license issued)");
    };

    let Some(external_product_id) = fields.external_product_id.clone() else {
        tracing::error!(order_id = %fields.order_id, "order carries no product id");
        return (StatusCode::OK, "OK (no product id, no license issued)");
    };

    let Some(product_code) = resolve_product_code(&state.config, event, &external_product_id)
    else {
        tracing::error!(
            external_product_id = %external_product_id,
            "no product mapping for this product id, fill PRODUCT_MAP"
        );
        return (StatusCode::OK, "OK (unmapped product, no license issued)");
    };

    let key = db::licenses::store_key(&fields.order_id, &external_product_id);

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    // Duplicate delivery: the stored record wins, not the retry.
    // issued_at and the signature stay stable.
    match db::licenses::get(&conn, &key) {
        Ok(Some(existing)) => {
            tracing::info!(
                key = %key,
                license_id = %existing.license_id,
                "license already issued for this order/product"
            );
            return (StatusCode::OK, "OK (already issued)");
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("DB error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    let Some(signer) = state.signer.clone() else {
        tracing::error!("LIC_ED25519_PRIVATE_KEY is not configured, cannot sign licenses");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server misconfigured (no license key)",
        );
    };

    let buyer_name = fields.buyer_name.clone().unwrap_or_else(|| buyer_email.clone());
    let identifier = fields
        .identifier
        .clone()
        .unwrap_or_else(|| fields.order_id.clone());
    let license_id = format!("LS-{identifier}");
    let issued_at = now_iso();

    let payload = LicensePayload {
        license_to: buyer_name.clone(),
        email: buyer_email.clone(),
        product_id: product_code.clone(),
        license_id: license_id.clone(),
        issued_at: issued_at.clone(),
        version: "1".to_string(),
    };

    let envelope = match signer.sign_payload(&payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!("Failed to sign license payload: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "License signing failed");
        }
    };

    let license_artifact = match signing::render_artifact(&envelope) {
        Ok(artifact) => artifact,
        Err(e) => {
            tracing::error!("Failed to render license artifact: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "License rendering failed");
        }
    };

    let record = LicenseRecord {
        schema_version: RECORD_SCHEMA_VERSION,
        status: LicenseStatus::Active,
        revoked_at: None,
        revocation_event_id: None,
        license_id,
        license_artifact,
        envelope,
        order_id: fields.order_id.clone(),
        order_identifier: fields.identifier.clone(),
        order_number: fields.order_number,
        external_product_id,
        product_code,
        product_version: fields.product_version.clone(),
        customer_id: fields.customer_id.clone(),
        buyer_email,
        buyer_name,
        receipt_url: fields.receipt_url.clone(),
        issued_at,
        created_at: now_iso(),
    };

    if let Err(e) = db::licenses::put(&conn, &key, &record) {
        tracing::error!("Failed to persist license record: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist license record",
        );
    }

    tracing::info!(
        key = %key,
        license_id = %record.license_id,
        product = %record.product_code,
        "license issued"
    );

    let _ = tasks::best_effort("license_email", state.email.send_license(&record)).await;

    (StatusCode::OK, "OK (license issued)")
}

/// Revoke the license for an `order_refunded` event.
///
/// Revocation is an annotation on the stored record; the signed payload
/// is untouched and keeps verifying. Re-delivery re-applies the same
/// mutation, preserving the first revocation timestamp and event link.
pub async fn process_order_refunded(
    state: AppState,
    event: &LemonSqueezyWebhookEvent,
    event_log_key: Option<String>,
) -> (StatusCode, &'static str) {
    let fields = OrderFields::from_event(event);

    let Some(external_product_id) = fields.external_product_id else {
        tracing::warn!(
            order_id = %fields.order_id,
            "refund event missing product id; cannot compute store key"
        );
        return (StatusCode::OK, "OK (refund: missing product id)");
    };

    let key = db::licenses::store_key(&fields.order_id, &external_product_id);

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let mut record = match db::licenses::get(&conn, &key) {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!(key = %key, "refund received but no license record found");
            return (StatusCode::OK, "OK (refund: nothing to revoke)");
        }
        Err(e) => {
            tracing::error!("DB error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    record.status = LicenseStatus::Refunded;
    if record.revoked_at.is_none() {
        record.revoked_at = Some(now_iso());
    }
    if record.revocation_event_id.is_none() {
        record.revocation_event_id = event_log_key;
    }

    if let Err(e) = db::licenses::put(&conn, &key, &record) {
        tracing::error!("Failed to persist refund revoke; forcing retry: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist refund revoke",
        );
    }

    tracing::info!(key = %key, status = record.status.as_str(), "license marked refunded");
    (StatusCode::OK, "OK (refund processed)")
}

/// Resolve the internal product code for an order. An explicit code in
/// the checkout's custom metadata wins; the static table keyed by the
/// provider's product id is the fallback.
fn resolve_product_code(
    config: &Config,
    event: &LemonSqueezyWebhookEvent,
    external_product_id: &str,
) -> Option<String> {
    event
        .meta
        .custom_data
        .as_ref()
        .and_then(|c| c.product_code.clone())
        .or_else(|| config.product_map.get(external_product_id).cloned())
}
