//! Guard layer for protected routes.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use warden_auth::{Authorized, Denial, Guard, IdentityLookup};
use warden_infra::SessionService;

use crate::app::{cookies, errors};
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct GuardLayerState {
    pub guard: Arc<Guard>,
    pub lookup: Arc<dyn IdentityLookup>,
    /// Set in session mode; credentials are then opaque session tokens.
    pub sessions: Option<SessionService>,
}

pub async fn guard_middleware(
    State(state): State<GuardLayerState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let credential = extract_credential(req.headers());

    match authorize(&state, credential.as_deref()).await {
        Ok(authorized) => {
            req.extensions_mut().insert(PrincipalContext::new(authorized));
            next.run(req).await
        }
        Err(denial) => errors::denial_response(denial),
    }
}

async fn authorize(state: &GuardLayerState, credential: Option<&str>) -> Result<Authorized, Denial> {
    let now = Utc::now();
    let Some(sessions) = &state.sessions else {
        return state.guard.evaluate(credential, state.lookup.as_ref(), now).await;
    };

    let Some(access) = credential.filter(|c| !c.is_empty()) else {
        return Err(Denial::MissingCredential);
    };
    let claims = sessions.resolve(access, now).await?;
    state.guard.evaluate_claims(claims, state.lookup.as_ref()).await
}

/// The `access` cookie wins over an `Authorization: Bearer` header.
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = cookies::read(headers, cookies::ACCESS) {
        return Some(cookie);
    }

    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    Some(token.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum::http::header::{AUTHORIZATION, COOKIE};

    use super::*;

    #[test]
    fn credential_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_credential(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("abc"));

        headers.insert(COOKIE, HeaderValue::from_static("access=xyz"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_credential(&headers), None);
    }
}
