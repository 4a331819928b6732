//! SQLite-backed key-value stores and the shared application state.
//!
//! Every table is a plain `(key, value-as-JSON)` relation: the hosted
//! deployment this service models used a per-key blob store with
//! last-writer-wins semantics and no cross-key transactions, and nothing
//! here assumes more than that.

pub mod events;
pub mod identity;
pub mod licenses;

use std::sync::Arc;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::config::Config;
use crate::email::EmailService;
use crate::error::Result;
use crate::identity::IdentityProvider;
use crate::signing::LicenseSigner;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    /// None when no signing key is configured; issuance answers 500.
    pub signer: Option<Arc<LicenseSigner>>,
    pub email: Arc<EmailService>,
    /// None when no auth-provider credentials are configured; account
    /// lookups answer 500.
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

pub fn create_pool(path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path);
    let pool = r2d2::Pool::builder().build(manager)?;
    init_schema(&*pool.get()?)?;
    Ok(pool)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS licenses (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS webhook_events (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS identity_mappings (
            auth_user_id TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS customer_links (
            customer_id TEXT PRIMARY KEY,
            auth_user_id TEXT NOT NULL
        );",
    )?;
    Ok(())
}
