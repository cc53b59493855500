//! Request-side session plumbing shared by the handlers.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::api::{error::ApiError, state::AppState};
use crate::auth::{AuthConfig, AuthError, Principal};

pub const SESSION_COOKIE_NAME: &str = "warden_session";

/// Resolve the caller from the bearer token or session cookie.
///
/// Role and status come from the credential store, never from the request.
pub(crate) async fn require_principal(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<Principal, ApiError> {
    let token = extract_session_token(headers).ok_or(ApiError(AuthError::AuthFailure))?;
    Ok(state.sessions().resolve(&token).await?)
}

/// `HttpOnly` session cookie carrying `token`.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl().as_secs();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Address used as the login rate-limit key.
///
/// The socket peer, unless the service runs behind a trusted proxy, in which case
/// the first `X-Forwarded-For` hop wins.
pub(crate) fn client_address(headers: &HeaderMap, peer: SocketAddr, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(forwarded) = forwarded {
            return forwarded.to_string();
        }
    }
    peer.ip().to_string()
}

pub(crate) fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id.trim()).map_err(|_| ApiError::invalid("invalid id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 10], 40_000))
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        headers.insert(COOKIE, HeaderValue::from_static("warden_session=cookie"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; warden_session=tok; other=1"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn empty_credentials_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        headers.insert(COOKIE, HeaderValue::from_static("warden_session="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn forwarded_header_needs_trust() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(client_address(&headers, peer(), false), "192.0.2.10");
        assert_eq!(client_address(&headers, peer(), true), "203.0.113.5");
        assert_eq!(
            client_address(&HeaderMap::new(), peer(), true),
            "192.0.2.10"
        );
    }

    #[test]
    fn cookie_flags() -> anyhow::Result<()> {
        let config = AuthConfig::new()
            .with_session_ttl(Duration::from_secs(600))
            .with_session_cookie_secure(true);
        let cookie = session_cookie(&config, "tok")?;
        assert_eq!(
            cookie.to_str()?,
            "warden_session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=600; Secure"
        );

        let cleared = clear_session_cookie(&config.with_session_cookie_secure(false))?;
        assert_eq!(
            cleared.to_str()?,
            "warden_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
        Ok(())
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        assert!(parse_id(" 67e55044-10b1-426f-9247-bb680e5fe0c8 ").is_ok());
    }
}
