//! Privileged license lookup for support work, gated by a shared admin
//! key. Returns raw records with every internal field visible.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::db::{self, AppState};
use crate::error::{AppError, Result};
use crate::models::LicenseRecord;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Filters may arrive as query parameters or as a JSON body; body values
/// win. The shared key may also arrive as the `key` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct AdminLookupFilters {
    pub email: Option<String>,
    #[serde(rename = "orderNumber")]
    pub order_number: Option<String>,
    #[serde(rename = "productId")]
    pub product_id: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminLookupResponse {
    pub matches: Vec<AdminLicenseRow>,
}

#[derive(Debug, Serialize)]
pub struct AdminLicenseRow {
    pub store_key: String,
    #[serde(flatten)]
    pub record: LicenseRecord,
}

/// POST /admin/licenses
pub async fn admin_get_license(
    State(state): State<AppState>,
    Query(query): Query<AdminLookupFilters>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AdminLookupResponse>> {
    let Some(admin_key) = state.config.admin_api_key.as_deref() else {
        return Err(AppError::Config("ADMIN_API_KEY is not configured".into()));
    };

    let supplied = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.key.clone())
        .unwrap_or_default();

    if supplied.len() != admin_key.len()
        || !bool::from(supplied.as_bytes().ct_eq(admin_key.as_bytes()))
    {
        return Err(AppError::Forbidden);
    }

    // A missing or non-JSON body just means "no body filters".
    let body_filters: AdminLookupFilters = if body.is_empty() {
        AdminLookupFilters::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_default()
    };

    let email = body_filters.email.or(query.email);
    let order_number = body_filters.order_number.or(query.order_number);
    let product_id = body_filters.product_id.or(query.product_id);

    if email.is_none() && order_number.is_none() {
        return Err(AppError::BadRequest(
            "provide at least email or orderNumber".into(),
        ));
    }

    let conn = state.db.get()?;
    let records = db::licenses::scan(&conn)?;

    let matches = records
        .into_iter()
        .filter(|(_, record)| {
            if let Some(ref email) = email {
                if !record.buyer_email.eq_ignore_ascii_case(email) {
                    return false;
                }
            }
            if let Some(ref order_number) = order_number {
                let record_number = record.order_number.map(|n| n.to_string());
                if record_number.as_deref() != Some(order_number.as_str()) {
                    return false;
                }
            }
            if let Some(ref product_id) = product_id {
                if record.product_code != *product_id {
                    return false;
                }
            }
            true
        })
        .map(|(store_key, record)| AdminLicenseRow { store_key, record })
        .collect();

    Ok(Json(AdminLookupResponse { matches }))
}
