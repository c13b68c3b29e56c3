//! Session cookie encoding and extraction.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};
use std::time::Duration;

use super::options::CookieOptions;

fn attributes(options: &CookieOptions, max_age: u64) -> String {
    let mut attrs = format!("; Path={}", options.path);
    if options.http_only {
        attrs.push_str("; HttpOnly");
    }
    attrs.push_str("; SameSite=");
    attrs.push_str(options.same_site.as_str());
    attrs.push_str(&format!("; Max-Age={max_age}"));
    if options.secure {
        attrs.push_str("; Secure");
    }
    attrs
}

/// Build the `Set-Cookie` value that carries a new session token.
pub(crate) fn session_cookie(
    options: &CookieOptions,
    token: &str,
    expires: Duration,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let cookie = format!(
        "{}={token}{}",
        options.name,
        attributes(options, expires.as_secs())
    );
    HeaderValue::from_str(&cookie)
}

/// Build the `Set-Cookie` value that removes the session cookie.
pub(crate) fn clear_session_cookie(
    options: &CookieOptions,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let cookie = format!("{}={}", options.name, attributes(options, 0));
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == cookie_name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}
