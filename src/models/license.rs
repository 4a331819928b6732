use serde::{Deserialize, Serialize};

/// Record schema version written with every new license record.
pub const RECORD_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Refunded,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Refunded => "refunded",
        }
    }
}

/// The signed license payload. Field names are the wire format the plugins
/// verify against; changing any of them invalidates every issued license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePayload {
    pub license_to: String,
    pub email: String,
    pub product_id: String,
    pub license_id: String,
    /// UTC, second precision, e.g. `2025-11-23T14:18:29Z`
    pub issued_at: String,
    pub version: String,
}

/// Signed envelope: payload plus a detached Ed25519 signature over the
/// canonical bytes of `{algorithm, payload}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub algorithm: String,
    pub payload: LicensePayload,
    /// base64url, no padding
    pub signature: String,
}

/// One license per (order, external product) pair.
///
/// The signed payload inside `envelope` is immutable once issued; only the
/// lifecycle fields (`status`, `revoked_at`, `revocation_event_id`) mutate
/// after creation. Revocation never touches the payload, so the signature
/// keeps verifying for refunded licenses too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRecord {
    #[serde(default)]
    pub schema_version: u32,
    pub status: LicenseStatus,
    pub revoked_at: Option<String>,
    /// Event-log key of the refund event that caused revocation.
    pub revocation_event_id: Option<String>,

    pub license_id: String,
    /// The banner-wrapped text block sent to the buyer.
    pub license_artifact: String,
    pub envelope: Envelope,

    pub order_id: String,
    pub order_identifier: Option<String>,
    pub order_number: Option<i64>,
    /// The payment provider's product id; half of the store key.
    pub external_product_id: String,
    /// Internal product code, e.g. `fedDSP-PHAT`.
    pub product_code: String,
    pub product_version: Option<String>,
    /// The commerce provider's durable customer id, when the event carried
    /// one. Used by identity reconciliation.
    pub customer_id: Option<String>,

    pub buyer_email: String,
    pub buyer_name: String,

    pub receipt_url: Option<String>,
    #[serde(default)]
    pub issued_at: String,
    #[serde(default)]
    pub created_at: String,
}

impl LicenseRecord {
    /// Timestamp used for "newest first" ordering in account views.
    /// Records from before `created_at` existed fall back to `issued_at`.
    pub fn purchased_at(&self) -> Option<&str> {
        if !self.created_at.is_empty() {
            Some(&self.created_at)
        } else if !self.issued_at.is_empty() {
            Some(&self.issued_at)
        } else {
            None
        }
    }
}
