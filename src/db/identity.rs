//! Identity mapping persistence: forward (auth user -> customer ids) and
//! a reverse index entry per commerce customer id.

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{AppError, Result};
use crate::models::IdentityMapping;

pub fn get_mapping(conn: &Connection, auth_user_id: &str) -> Result<Option<IdentityMapping>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM identity_mappings WHERE auth_user_id = ?1",
            params![auth_user_id],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => {
            let mapping = serde_json::from_str(&raw).map_err(|e| {
                AppError::Internal(format!("stored identity mapping is corrupt: {e}"))
            })?;
            Ok(Some(mapping))
        }
        None => Ok(None),
    }
}

pub fn put_mapping(conn: &Connection, mapping: &IdentityMapping) -> Result<()> {
    let value = serde_json::to_string(mapping)
        .map_err(|e| AppError::Internal(format!("identity mapping failed to serialize: {e}")))?;
    conn.execute(
        "INSERT OR REPLACE INTO identity_mappings (auth_user_id, value) VALUES (?1, ?2)",
        params![mapping.auth_user_id, value],
    )?;
    Ok(())
}

/// Reverse index: which auth user a commerce customer id belongs to.
pub fn link_customer(conn: &Connection, customer_id: &str, auth_user_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO customer_links (customer_id, auth_user_id) VALUES (?1, ?2)",
        params![customer_id, auth_user_id],
    )?;
    Ok(())
}

pub fn get_customer_link(conn: &Connection, customer_id: &str) -> Result<Option<String>> {
    let auth_user_id: Option<String> = conn
        .query_row(
            "SELECT auth_user_id FROM customer_links WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(auth_user_id)
}
