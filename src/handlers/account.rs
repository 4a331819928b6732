//! Authenticated purchase lookup backing the account page.

use axum::Json;
use axum::extract::State;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use serde::Serialize;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::identity;
use crate::models::LicenseRecord;

#[derive(Debug, Serialize)]
pub struct PurchasesResponse {
    pub purchases: Vec<PurchaseRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRow {
    pub id: String,
    pub order_number: String,
    pub purchased_at: Option<String>,
    pub product_id: String,
    pub product_name: String,
    pub license_key: String,
    pub license_status: String,
    pub download_url: String,
    pub receipt_url: String,
}

/// GET /account/purchases
///
/// Only a missing or invalid token is a hard error; every other failure
/// degrades to an empty purchase list inside `resolve_purchases`.
pub async fn get_purchases(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<PurchasesResponse>> {
    let auth =
        auth.ok_or_else(|| AppError::Unauthenticated("missing bearer token".into()))?;

    let Some(provider) = state.identity.clone() else {
        return Err(AppError::Config("CLERK_SECRET_KEY is not configured".into()));
    };

    let subject = provider.verify_token(auth.token()).await?;

    let matches = identity::resolve_purchases(&state, provider.as_ref(), &subject).await;

    let purchases = matches
        .into_iter()
        .map(|(key, record)| purchase_row(key, record))
        .collect();
    Ok(Json(PurchasesResponse { purchases }))
}

fn purchase_row(key: String, record: LicenseRecord) -> PurchaseRow {
    let purchased_at = record.purchased_at().map(str::to_string);
    PurchaseRow {
        id: key,
        order_number: record
            .order_number
            .map(|n| n.to_string())
            .unwrap_or_default(),
        purchased_at,
        product_id: record.product_code.clone(),
        product_name: record.product_code,
        license_key: record.license_artifact,
        license_status: record.status.as_str().to_string(),
        // Download links are not wired up yet; the account UI shows the
        // placeholder as a disabled button.
        download_url: "#".to_string(),
        receipt_url: record.receipt_url.unwrap_or_else(|| "#".to_string()),
    }
}
