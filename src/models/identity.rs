use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Mapping from an auth-provider user to the commerce customer ids that
/// have been discovered for them.
///
/// `linked_at` is set once and preserved across updates; the id set only
/// grows (there is no correction path in this service).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub auth_user_id: String,
    pub commerce_customer_ids: BTreeSet<String>,
    pub linked_at: String,
    pub updated_at: String,
}
