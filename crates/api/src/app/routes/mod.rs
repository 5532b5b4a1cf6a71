use axum::{routing::get, Router};

use warden_schema::AuthMode;

pub mod account;
pub mod system;

/// Public routes: health plus the account endpoints under `prefix`.
pub fn router(prefix: &str, mode: AuthMode) -> Router {
    let base = Router::new().route("/health", get(system::health));
    if prefix.is_empty() {
        base.merge(account::router(mode))
    } else {
        base.nest(prefix, account::router(mode))
    }
}
