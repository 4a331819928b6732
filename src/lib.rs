//! License fulfillment service for the fedDSP plugin store.
//!
//! LemonSqueezy order webhooks drive a small lifecycle per
//! (order, product) pair: issue a signed license on `order_created`,
//! annotate it as refunded on `order_refunded`. Licenses are Ed25519
//! signatures over canonical JSON, wrapped in a banner block the plugins
//! accept. An authenticated account endpoint resolves a Clerk user's
//! purchases, reconciling the auth identity with LemonSqueezy customer
//! ids along the way.

pub mod canonical;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod payments;
pub mod signing;
pub mod tasks;
pub mod util;
