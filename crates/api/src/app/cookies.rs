//! Minimal cookie handling for the `access` / `refresh` credentials.

use axum::http::header::{COOKIE, HeaderValue, SET_COOKIE};
use axum::http::HeaderMap;
use chrono::Duration;

pub const ACCESS: &str = "access";
pub const REFRESH: &str = "refresh";

/// First value of cookie `name` across all `Cookie` headers.
pub fn read(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
}

/// `Set-Cookie` value for an HTTP-only credential cookie.
pub fn set(name: &str, value: &str, max_age: Duration) -> Option<HeaderValue> {
    let max_age = max_age.num_seconds().max(0);
    HeaderValue::from_str(&format!(
        "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    ))
    .ok()
}

/// `Set-Cookie` value that expires `name` immediately.
pub fn clear(name: &str) -> Option<HeaderValue> {
    set(name, "", Duration::zero())
}

pub fn append(headers: &mut HeaderMap, value: Option<HeaderValue>) {
    if let Some(value) = value {
        headers.append(SET_COOKIE, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; access=abc.def"));
        headers.append(COOKIE, HeaderValue::from_static("refresh=r1"));

        assert_eq!(read(&headers, ACCESS).as_deref(), Some("abc.def"));
        assert_eq!(read(&headers, REFRESH).as_deref(), Some("r1"));
        assert_eq!(read(&headers, "missing"), None);
    }

    #[test]
    fn set_cookie_is_http_only() {
        let value = set(ACCESS, "tok", Duration::seconds(90)).unwrap();
        let value = value.to_str().unwrap();
        assert!(value.starts_with("access=tok;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Max-Age=90"));
        assert!(clear(ACCESS).unwrap().to_str().unwrap().contains("Max-Age=0"));
    }
}
