use serde::{Deserialize, Serialize};

/// Raw inbound webhook payload as appended to the event log.
/// Write-once; kept for audit and offline replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWebhookEvent {
    pub received_at: String,
    pub event_name: String,
    pub order_id: String,
    pub payload: serde_json::Value,
}
