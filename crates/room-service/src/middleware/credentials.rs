//! Request credentials: cookies, headers and the client address.

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use std::net::{IpAddr, SocketAddr};

/// Cookie (and header) carrying the membership token.
pub const MEMBERSHIP_COOKIE: &str = "x-auth-token";

/// Cookie (and header) carrying the password acknowledgment.
pub const PASSWORD_COOKIE: &str = "x-room-password";

/// Identifier used when no client address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Read a credential from the header `name`, falling back to the cookie of
/// the same name. Empty values count as absent.
pub fn credential(headers: &HeaderMap, name: &str) -> Option<String> {
    if let Some(value) = headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Build a `Set-Cookie` value scoped to the whole site.
///
/// Cookies are always `HttpOnly` and `SameSite=Strict`; `Secure` follows
/// configuration so plain-HTTP development still works.
pub fn set_cookie(
    name: &str,
    value: &str,
    max_age_secs: u64,
    secure: bool,
) -> Option<HeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// Address a request is attributed to for rate limiting.
///
/// With `trust_proxy_headers`, the first `X-Forwarded-For` hop or
/// `X-Real-IP` wins. Otherwise only the socket peer counts, since those
/// headers are client-controlled.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .and_then(|v| v.parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .and_then(|v| v.parse::<IpAddr>().ok());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}
