//! Cookie-backed sessions with opaque server-side tokens.
//!
//! The cookie carries only a uuid; the user id lives in the `sessions`
//! table together with an expiry, so a forged cookie names nothing and a
//! leaked one ages out.

use anyhow::Result;
use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::{self, Pool};

pub const SESSION_COOKIE: &str = "qr_hub_session";

/// Mint a session for `user_id` and return the raw token to be set as a
/// cookie.
pub async fn issue(pool: &Pool, user_id: i64, ttl_hours: i64) -> Result<String> {
    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    db::create_session(pool, &token, user_id, expires_at).await?;
    Ok(token)
}

/// Resolve the current owner from request headers: absent cookie, unknown
/// token, and expired token all come back `None`.
pub async fn current_owner(pool: &Pool, headers: &HeaderMap) -> Result<Option<i64>> {
    let Some(token) = token_from_headers(headers) else {
        return Ok(None);
    };
    db::session_user_id(pool, &token).await
}

/// Drop the session named by the request's cookie, if any.
pub async fn clear(pool: &Pool, headers: &HeaderMap) -> Result<()> {
    if let Some(token) = token_from_headers(headers) {
        db::delete_session(pool, &token).await?;
    }
    Ok(())
}

pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    token_from_cookie_header(cookies).map(str::to_string)
}

/// Pull our session token out of a `Cookie:` header value.
pub fn token_from_cookie_header(cookies: &str) -> Option<&str> {
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

/// `Set-Cookie` value installing `token` for `ttl_hours`.
pub fn set_cookie(token: &str, ttl_hours: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl_hours * 3600
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}
