pub mod account;
pub mod admin;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(webhooks::router())
        .route("/account/purchases", get(account::get_purchases))
        .route("/admin/licenses", post(admin::admin_get_license))
}
