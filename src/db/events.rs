//! Append-only raw webhook event log.
//!
//! Best effort by contract: callers go through `tasks::best_effort_sync`
//! and a failed append never aborts license issuance. Reads exist for
//! offline audit and replay, not for the request path.

use rand::RngCore;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{AppError, Result};
use crate::models::StoredWebhookEvent;

pub fn append(conn: &Connection, event: &StoredWebhookEvent) -> Result<String> {
    let mut rand_bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut rand_bytes);

    // Duplicate deliveries can land within the same wall-clock second;
    // the random suffix keeps their keys distinct.
    let key = format!(
        "evt_{}_{}_{}_{}",
        event.received_at,
        event.event_name,
        event.order_id,
        hex::encode(rand_bytes)
    );

    let value = serde_json::to_string(event)
        .map_err(|e| AppError::Internal(format!("webhook event failed to serialize: {e}")))?;
    conn.execute(
        "INSERT INTO webhook_events (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(key)
}

pub fn get(conn: &Connection, key: &str) -> Result<Option<StoredWebhookEvent>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM webhook_events WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => {
            let event = serde_json::from_str(&raw)
                .map_err(|e| AppError::Internal(format!("stored webhook event is corrupt: {e}")))?;
            Ok(Some(event))
        }
        None => Ok(None),
    }
}
