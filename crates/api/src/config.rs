//! Environment configuration for the HTTP surface.

use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::warn;

use warden_core::ArgumentsError;
use warden_schema::AuthMode;

const DEV_SECRET: &str = "dev-secret";
/// Ten years; longer lifetimes are treated as misconfiguration.
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;
const MAX_LOOKUP_TIMEOUT_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind: String,
    /// Mount point of the account routes. Empty means the root.
    pub prefix: String,
    pub jwt_secret: String,
    pub auth_mode: AuthMode,
    pub token_ttl: Duration,
    pub session_ttl: Duration,
    pub db_schema: Option<String>,
    /// In-memory storage when absent.
    pub database_url: Option<String>,
    pub lookup_timeout: StdDuration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            prefix: "/user".to_string(),
            jwt_secret: DEV_SECRET.to_string(),
            auth_mode: AuthMode::Token,
            token_ttl: Duration::minutes(15),
            session_ttl: Duration::days(1),
            db_schema: None,
            database_url: None,
            lookup_timeout: StdDuration::from_millis(2000),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ArgumentsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ArgumentsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            defaults.jwt_secret.clone()
        });

        let auth_mode = match get("WARDEN_AUTH_MODE") {
            None => defaults.auth_mode,
            Some(raw) => parse_mode(&raw)?,
        };

        Ok(Self {
            bind: get("WARDEN_BIND").unwrap_or(defaults.bind),
            prefix: get("WARDEN_PREFIX")
                .map(|p| normalize_prefix(&p))
                .unwrap_or(defaults.prefix),
            jwt_secret,
            auth_mode,
            token_ttl: ttl(&get, "WARDEN_TOKEN_TTL_SECS")?.unwrap_or(defaults.token_ttl),
            session_ttl: ttl(&get, "WARDEN_SESSION_TTL_SECS")?.unwrap_or(defaults.session_ttl),
            db_schema: get("WARDEN_DB_SCHEMA"),
            database_url: get("DATABASE_URL"),
            lookup_timeout: positive(&get, "WARDEN_LOOKUP_TIMEOUT_MS", MAX_LOOKUP_TIMEOUT_MS)?
                .map(|ms| StdDuration::from_millis(ms as u64))
                .unwrap_or(defaults.lookup_timeout),
        })
    }
}

/// Token and session mode cannot both be enabled.
fn parse_mode(raw: &str) -> Result<AuthMode, ArgumentsError> {
    let modes: Vec<&str> = raw
        .split([',', '+'])
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .collect();
    match modes.as_slice() {
        [one] => one.parse().map_err(ArgumentsError::new),
        _ => Err(ArgumentsError::new(format!(
            "exactly one auth mode must be selected, got '{raw}'"
        ))),
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Integer setting in `1..=max`.
fn positive<G>(get: &G, key: &str, max: i64) -> Result<Option<i64>, ArgumentsError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<i64>() {
        Ok(v) if (1..=max).contains(&v) => Ok(Some(v)),
        _ => Err(ArgumentsError::new(format!(
            "{key} must be an integer between 1 and {max}, got '{raw}'"
        ))),
    }
}

/// Lifetime in whole seconds.
fn ttl<G>(get: &G, key: &str) -> Result<Option<Duration>, ArgumentsError>
where
    G: Fn(&str) -> Option<String>,
{
    positive(get, key, MAX_TTL_SECS)?
        .map(|secs| {
            Duration::try_seconds(secs)
                .ok_or_else(|| ArgumentsError::new(format!("{key} is out of range, got {secs}")))
        })
        .transpose()
}
