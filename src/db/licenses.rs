//! License Store: one JSON record per (order, external product) pair.

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{AppError, Result};
use crate::models::LicenseRecord;

/// Store key for a license record. Reproducible from any later event that
/// names the same order and product, which is what lets a refund locate
/// the exact record its `order_created` wrote.
pub fn store_key(order_id: &str, external_product_id: &str) -> String {
    format!("{order_id}:{external_product_id}")
}

pub fn get(conn: &Connection, key: &str) -> Result<Option<LicenseRecord>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM licenses WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => {
            let record = serde_json::from_str(&raw).map_err(|e| {
                AppError::Internal(format!("stored license record is corrupt: {e}"))
            })?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Full overwrite of the record at `key`; read-modify-write is the
/// caller's job.
pub fn put(conn: &Connection, key: &str, record: &LicenseRecord) -> Result<()> {
    let value = serde_json::to_string(record)
        .map_err(|e| AppError::Internal(format!("license record failed to serialize: {e}")))?;
    conn.execute(
        "INSERT OR REPLACE INTO licenses (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_keys(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT key FROM licenses ORDER BY key")?;
    let keys = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(keys)
}

/// Read every record for the account/admin scan paths. Rows that no
/// longer decode are skipped with a log line rather than failing the
/// whole scan.
pub fn scan(conn: &Connection) -> Result<Vec<(String, LicenseRecord)>> {
    let mut stmt = conn.prepare("SELECT key, value FROM licenses")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (key, raw) = row?;
        match serde_json::from_str::<LicenseRecord>(&raw) {
            Ok(record) => records.push((key, record)),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "skipping undecodable license record")
            }
        }
    }
    Ok(records)
}
