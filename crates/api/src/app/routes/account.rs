//! Registration, login and session endpoints.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::Value as JsonValue;

use warden_auth::{DEFAULT_ROLE, Denial};
use warden_infra::Session;
use warden_schema::AuthMode;

use crate::app::dto::{LoginResponse, MessageResponse, RegisterResponse};
use crate::app::services::AppServices;
use crate::app::{cookies, errors};

pub fn router(mode: AuthMode) -> Router {
    let router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login));
    match mode {
        AuthMode::Token => router,
        AuthMode::Session => router
            .route("/refresh", post(refresh))
            .route("/logout", post(logout)),
    }
}

/// POST /register - create a principal with the default role
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    match services.accounts.register(&body, DEFAULT_ROLE, &[]).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                msg: "registered",
                id,
            }),
        )
            .into_response(),
        Err(e) => errors::account_error_response(e),
    }
}

/// POST /login - token mode returns the token and sets the `access` cookie;
/// session mode sets `access` and `refresh` cookies
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    let now = Utc::now();
    let Some(sessions) = &services.sessions else {
        return match services.accounts.login(&body, now).await {
            Ok(grant) => {
                let mut headers = HeaderMap::new();
                cookies::append(
                    &mut headers,
                    cookies::set(cookies::ACCESS, &grant.token, services.config.token_ttl),
                );
                (StatusCode::OK, headers, Json(LoginResponse::token(grant.token))).into_response()
            }
            Err(e) => errors::account_error_response(e),
        };
    };

    let row = match services.accounts.authenticate(&body).await {
        Ok(row) => row,
        Err(e) => return errors::account_error_response(e),
    };
    let owner = match services.accounts.identity_of(&row) {
        Ok(id) => id,
        Err(e) => return errors::account_error_response(e),
    };
    match sessions.open(owner, now).await {
        Ok(session) => session_response(&services, &session, LoginResponse::session()),
        Err(e) => errors::account_error_response(e),
    }
}

/// POST /refresh - rotate the session named by the `refresh` cookie
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let Some(sessions) = &services.sessions else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found");
    };
    let Some(token) = cookies::read(&headers, cookies::REFRESH) else {
        return errors::denial_response(Denial::MissingCredential);
    };
    match sessions.refresh(&token, Utc::now()).await {
        Ok(session) => session_response(&services, &session, MessageResponse { msg: "refreshed" }),
        Err(denial) => errors::denial_response(denial),
    }
}

/// POST /logout - close the session named by the `access` cookie
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let Some(sessions) = &services.sessions else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found");
    };
    let Some(token) = cookies::read(&headers, cookies::ACCESS) else {
        return errors::denial_response(Denial::MissingCredential);
    };
    match sessions.close(&token).await {
        Ok(_) => {
            let mut out = HeaderMap::new();
            cookies::append(&mut out, cookies::clear(cookies::ACCESS));
            cookies::append(&mut out, cookies::clear(cookies::REFRESH));
            (StatusCode::OK, out, Json(MessageResponse { msg: "logged out" })).into_response()
        }
        Err(e) => errors::account_error_response(e),
    }
}

fn session_response<T: serde::Serialize>(
    services: &AppServices,
    session: &Session,
    body: T,
) -> axum::response::Response {
    let ttl = services.config.session_ttl;
    let mut headers = HeaderMap::new();
    cookies::append(&mut headers, cookies::set(cookies::ACCESS, &session.access.to_string(), ttl));
    cookies::append(&mut headers, cookies::set(cookies::REFRESH, &session.refresh.to_string(), ttl));
    (StatusCode::OK, headers, Json(body)).into_response()
}
