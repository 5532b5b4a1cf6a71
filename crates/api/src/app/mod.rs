//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage selection and service construction
//! - `routes/`: public handlers (health, account endpoints)
//! - `dto.rs`: response bodies
//! - `cookies.rs`: credential cookies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use warden_core::ArgumentsError;

use crate::config::ApiConfig;
use crate::demo;

pub mod cookies;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError};

/// Build the full HTTP router from configuration (entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> Result<Router, StartupError> {
    let services = services::build_services(config, demo::declaration()).await?;
    Ok(build_router(Arc::new(services))?)
}

/// Router over already-built services.
pub fn build_router(services: Arc<AppServices>) -> Result<Router, ArgumentsError> {
    let protected = demo::router(&services)?;

    Ok(routes::router(&services.config.prefix, services.mode())
        .merge(protected)
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
}
