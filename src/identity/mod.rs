//! Identity reconciliation: maps the auth provider's durable user id onto
//! the commerce customer ids discovered from purchases.
//!
//! The auth provider and the commerce provider share no primary key. The
//! first successful lookup matches purchases by *verified* email and
//! harvests the commerce customer ids it finds into a persisted mapping;
//! every later lookup matches by those ids alone, so a checkout made
//! under a different email than the account keeps resolving.

pub mod clerk;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::db::{self, AppState};
use crate::error::Result;
use crate::models::{IdentityMapping, LicenseRecord};
use crate::tasks;
use crate::util::now_iso;

pub use clerk::ClerkClient;

#[derive(Debug, Clone)]
pub struct AuthSubject {
    pub user_id: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer token and return the durable subject it belongs to.
    async fn verify_token(&self, token: &str) -> Result<AuthSubject>;

    /// The subject's verified email addresses. Unverified and
    /// client-supplied addresses are never returned.
    async fn verified_emails(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Resolve an authenticated subject's purchases, newest first.
///
/// Matching prefers the persisted customer-id mapping; verified emails
/// are the one-time bootstrap path. Anything that fails after
/// authentication degrades to an empty list; this endpoint backs a UI
/// that must not hard-fail because a backfill hiccuped.
pub async fn resolve_purchases(
    state: &AppState,
    provider: &dyn IdentityProvider,
    subject: &AuthSubject,
) -> Vec<(String, LicenseRecord)> {
    match resolve_purchases_inner(state, provider, subject).await {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!(
                user_id = %subject.user_id,
                error = %e,
                "purchase lookup failed, returning empty list"
            );
            Vec::new()
        }
    }
}

async fn resolve_purchases_inner(
    state: &AppState,
    provider: &dyn IdentityProvider,
    subject: &AuthSubject,
) -> Result<Vec<(String, LicenseRecord)>> {
    let conn = state.db.get()?;

    let mapping = db::identity::get_mapping(&conn, &subject.user_id)?;
    let mapped_ids: BTreeSet<String> = mapping
        .as_ref()
        .map(|m| m.commerce_customer_ids.clone())
        .unwrap_or_default();

    let records = db::licenses::scan(&conn)?;

    let mut matches: Vec<(String, LicenseRecord)> = if !mapped_ids.is_empty() {
        // Durable path: the mapping exists, match on commerce customer
        // ids. Checkout emails drift; these ids do not.
        records
            .into_iter()
            .filter(|(_, record)| {
                record
                    .customer_id
                    .as_ref()
                    .is_some_and(|id| mapped_ids.contains(id))
            })
            .collect()
    } else {
        // Bootstrap path: first contact for this subject. Match on the
        // provider's verified emails, case-insensitive exact.
        let emails: Vec<String> = provider
            .verified_emails(&subject.user_id)
            .await?
            .into_iter()
            .map(|e| e.to_lowercase())
            .collect();
        if emails.is_empty() {
            return Ok(Vec::new());
        }
        records
            .into_iter()
            .filter(|(_, record)| emails.contains(&record.buyer_email.to_lowercase()))
            .collect()
    };

    // Harvest commerce ids from the matches and persist anything new.
    // Both writes are side work: a failure here never fails the read.
    let discovered: BTreeSet<String> = matches
        .iter()
        .filter_map(|(_, record)| record.customer_id.clone())
        .collect();
    sync_mapping(&conn, subject, mapping, &discovered);

    matches.sort_by(|(_, a), (_, b)| match (a.purchased_at(), b.purchased_at()) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    Ok(matches)
}

/// Persist the forward mapping and the reverse index entries when the
/// discovered set brings anything new. `linked_at` is set once and
/// survives updates; the id set only grows.
fn sync_mapping(
    conn: &rusqlite::Connection,
    subject: &AuthSubject,
    existing: Option<IdentityMapping>,
    discovered: &BTreeSet<String>,
) {
    if discovered.is_empty() {
        return;
    }

    let now = now_iso();
    let (mut mapping, changed) = match existing {
        Some(mapping) => {
            let changed = !discovered.is_subset(&mapping.commerce_customer_ids);
            (mapping, changed)
        }
        None => (
            IdentityMapping {
                auth_user_id: subject.user_id.clone(),
                commerce_customer_ids: BTreeSet::new(),
                linked_at: now.clone(),
                updated_at: now.clone(),
            },
            true,
        ),
    };
    if !changed {
        return;
    }

    mapping.commerce_customer_ids.extend(discovered.iter().cloned());
    mapping.updated_at = now;

    let _ = tasks::best_effort_sync(
        "identity_mapping_put",
        db::identity::put_mapping(conn, &mapping),
    );
    for customer_id in discovered {
        let _ = tasks::best_effort_sync(
            "customer_link_put",
            db::identity::link_customer(conn, customer_id, &subject.user_id),
        );
    }
}
