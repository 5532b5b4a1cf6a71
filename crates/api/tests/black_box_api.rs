use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde_json::json;

use warden_api::app::{AppServices, build_router, services::build_services};
use warden_api::config::ApiConfig;
use warden_api::demo;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(mode: &str) -> Self {
        let env = HashMap::from([
            ("JWT_SECRET", SECRET.to_string()),
            ("WARDEN_AUTH_MODE", mode.to_string()),
        ]);
        let config = ApiConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        let services = Arc::new(build_services(&config, demo::declaration()).await.unwrap());

        // Same router as prod, bound to an ephemeral port.
        let app = build_router(services.clone()).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register directly through the service so a role other than the default can be used.
    async fn seed(&self, username: &str, role: &str) {
        self.services
            .accounts
            .register(&json!({ "username": username, "password": "pw" }), role, &[])
            .await
            .unwrap();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn login(client: &reqwest::Client, srv: &TestServer, username: &str) -> reqwest::Response {
    client
        .post(srv.url("/user/login"))
        .json(&json!({ "username": username, "password": "pw" }))
        .send()
        .await
        .unwrap()
}

async fn token_for(client: &reqwest::Client, srv: &TestServer, username: &str) -> String {
    let res = login(client, srv, username).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

fn cookie_value(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .filter_map(|h| h.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

async fn error_code(res: reqwest::Response) -> String {
    let body: serde_json::Value = res.json().await.unwrap();
    body["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn("token").await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_and_garbage_credentials_are_told_apart() {
    let srv = TestServer::spawn("token").await;
    let client = reqwest::Client::new();

    let res = client.post(srv.url("/hello-admin")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "missing_credential");

    let res = client
        .post(srv.url("/hello-admin"))
        .bearer_auth("not.a.token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "invalid_credential");
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let srv = TestServer::spawn("token").await;
    srv.seed("amy", "admin").await;

    let claims = json!({
        "uid": 1,
        "exp": (Utc::now() - ChronoDuration::minutes(1)).timestamp(),
        "perms": [1],
    });
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt");

    let res = reqwest::Client::new()
        .post(srv.url("/hello-admin"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "expired_credential");
}

#[tokio::test]
async fn register_then_login_with_default_role() {
    let srv = TestServer::spawn("token").await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/user/register"))
        .json(&json!({ "password": "pw", "username": "bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["id"], 1);

    let res = login(&client, &srv, "bob").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(cookie_value(&res, "access").is_some());
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["msg"], "Successful login!");
    let token = body["token"].as_str().unwrap();

    // The default role grants nothing.
    let res = client
        .post(srv.url("/hello-admin"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "insufficient_rights");
}

#[tokio::test]
async fn registration_failures_carry_codes() {
    let srv = TestServer::spawn("token").await;
    let client = reqwest::Client::new();
    let register = |body: serde_json::Value| {
        client.post(srv.url("/user/register")).json(&body).send()
    };

    let res = register(json!({ "password": "pw", "username": "bob", "email": "b@x.io" }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(res).await, "only_one_field_required");

    let res = register(json!({ "password": "pw" })).await.unwrap();
    assert_eq!(error_code(res).await, "fields_required");

    register(json!({ "password": "pw", "username": "bob" })).await.unwrap();
    let res = register(json!({ "password": "other", "username": "bob" }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "data_invalid");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let srv = TestServer::spawn("token").await;
    srv.seed("amy", "admin").await;

    let res = reqwest::Client::new()
        .post(srv.url("/user/login"))
        .json(&json!({ "username": "amy", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "wrong_credentials");
}

#[tokio::test]
async fn roles_gate_the_demo_routes() {
    let srv = TestServer::spawn("token").await;
    srv.seed("amy", "admin").await;
    srv.seed("carl", "client").await;
    let client = reqwest::Client::new();
    let admin = token_for(&client, &srv, "amy").await;
    let customer = token_for(&client, &srv, "carl").await;

    let res = client
        .post(srv.url("/hello-admin"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<String>().await.unwrap(), "hello, im admin!");

    // Cookie credential works the same way.
    let res = client
        .post(srv.url("/do-action-1"))
        .header(COOKIE, format!("access={admin}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/hello-client"))
        .bearer_auth(&customer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["username"], "carl");
    assert!(body.get("password").is_none());

    let res = client
        .post(srv.url("/do-action-1"))
        .bearer_auth(&customer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_mode_uses_cookies_and_rotates() {
    let srv = TestServer::spawn("session").await;
    srv.seed("amy", "admin").await;
    let client = reqwest::Client::new();

    let res = login(&client, &srv, "amy").await;
    assert_eq!(res.status(), StatusCode::OK);
    let access = cookie_value(&res, "access").unwrap();
    let refresh = cookie_value(&res, "refresh").unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body.get("token").is_none());

    let res = client
        .post(srv.url("/hello-admin"))
        .header(COOKIE, format!("access={access}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/user/refresh"))
        .header(COOKIE, format!("refresh={refresh}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let rotated = cookie_value(&res, "access").unwrap();
    assert_ne!(rotated, access);

    let res = client
        .post(srv.url("/hello-admin"))
        .header(COOKIE, format!("access={access}"))
        .send()
        .await
        .unwrap();
    assert_eq!(error_code(res).await, "invalid_credential");

    let res = client
        .post(srv.url("/user/logout"))
        .header(COOKIE, format!("access={rotated}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/hello-admin"))
        .header(COOKIE, format!("access={rotated}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}
