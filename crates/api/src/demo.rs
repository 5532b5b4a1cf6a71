//! Demonstration entity and the routes it protects.

use std::sync::Arc;

use axum::{
    extract::Extension,
    middleware,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::json;

use warden_auth::{Guard, Requirements, RoleDescriptor};
use warden_core::{ArgumentsError, ValueType};
use warden_infra::ModelDeclaration;
use warden_schema::{AttributeDecl, FieldTag, HashTransform, StorageDeclaration};

use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::{GuardLayerState, guard_middleware};

/// `User` with one password and exactly one of username, email or phone as
/// login key. Roles `admin` (action_1) and `client` (action_2).
pub fn declaration() -> ModelDeclaration {
    let sha = HashTransform::sha256;
    let keys = ["username", "email", "phone"];
    let others = |name: &str| -> Vec<&'static str> {
        keys.iter().copied().filter(|k| *k != name).collect()
    };

    ModelDeclaration {
        entity: "User".into(),
        attributes: vec![
            AttributeDecl::new("id", ValueType::Int)
                .tag(FieldTag::identity())
                .tag(FieldTag::base()),
            AttributeDecl::new("password", ValueType::Str)
                .tag(FieldTag::register().hash(sha()))
                .tag(FieldTag::login().hash(sha())),
            AttributeDecl::new("username", ValueType::Str)
                .tag(FieldTag::base().optional())
                .tag(FieldTag::login().xor(others("username")))
                .tag(FieldTag::register().xor(others("username"))),
            AttributeDecl::new("email", ValueType::Email)
                .tag(FieldTag::contact().confirm())
                .tag(FieldTag::base().optional())
                .tag(FieldTag::login().xor(others("email")))
                .tag(FieldTag::register().xor(others("email"))),
            AttributeDecl::new("phone", ValueType::Phone)
                .tag(FieldTag::contact())
                .tag(FieldTag::login().xor(others("phone")))
                .tag(FieldTag::register().xor(others("phone"))),
            AttributeDecl::new("discord", ValueType::Str)
                .tag(FieldTag::contact())
                .tag(FieldTag::register().optional()),
            AttributeDecl::new("field", ValueType::Str).default_value("empty"),
        ],
        storage: StorageDeclaration::new()
            .nullable(["username", "email", "phone", "discord"])
            .unique(keys),
        roles: vec![
            RoleDescriptor::new("admin").grant("action_1"),
            RoleDescriptor::new("client").deny("action_1").grant("action_2"),
        ],
        default_grants: Some(vec![]),
        ..ModelDeclaration::default()
    }
}

/// Guarded demonstration routes.
pub fn router(services: &AppServices) -> Result<Router, ArgumentsError> {
    Ok(Router::new()
        .merge(guarded(
            services,
            Router::new().route("/hello-admin", post(hello_admin)),
            Requirements::new().role("admin"),
        )?)
        .merge(guarded(
            services,
            Router::new().route("/hello-client", post(hello_client)),
            Requirements::new().role("client").with_identity(),
        )?)
        .merge(guarded(
            services,
            Router::new().route("/do-action-1", post(do_action_1)),
            Requirements::new().permission("action_1").with_identity(),
        )?))
}

/// Wrap every route of `routes` in a guard built from `requirements`.
pub fn guarded(
    services: &AppServices,
    routes: Router,
    requirements: Requirements,
) -> Result<Router, ArgumentsError> {
    let guard = Guard::new(
        requirements,
        &services.model.roles,
        services.codec.clone(),
        Arc::new(services.model.views.base.clone()),
    )?;
    let state = GuardLayerState {
        guard: Arc::new(guard),
        lookup: services.lookup.clone(),
        sessions: services.sessions.clone(),
    };
    Ok(routes.route_layer(middleware::from_fn_with_state(state, guard_middleware)))
}

pub async fn hello_admin() -> impl IntoResponse {
    Json("hello, im admin!")
}

pub async fn hello_client(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(principal.identity().map(|r| r.to_json()).unwrap_or_default())
}

pub async fn do_action_1(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    tracing::info!(identity = %principal.identity_id(), "action 1 performed");
    Json(json!({ "msg": "action 1 done!" }))
}
