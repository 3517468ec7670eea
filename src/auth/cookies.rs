//! Session and OAuth-state cookies

use axum::http::{header, HeaderMap};
use cookie::{time::Duration, Cookie, SameSite};

use crate::services::sessions::SESSION_TTL_DAYS;

pub const SESSION_COOKIE: &str = "session_token";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

fn build_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, secure: bool) -> String {
    build_cookie(
        SESSION_COOKIE,
        token.to_string(),
        Duration::days(SESSION_TTL_DAYS),
        secure,
    )
    .to_string()
}

/// `Set-Cookie` value carrying the OAuth anti-forgery state.
pub fn oauth_state_cookie(state: &str, secure: bool) -> String {
    build_cookie(
        OAUTH_STATE_COOKIE,
        state.to_string(),
        Duration::minutes(OAUTH_STATE_TTL_MINUTES),
        secure,
    )
    .to_string()
}

/// `Set-Cookie` value that clears `name` on the client.
pub fn removal_cookie(name: &'static str, secure: bool) -> String {
    let mut cookie = build_cookie(name, String::new(), Duration::ZERO, secure);
    cookie.make_removal();
    cookie.to_string()
}

/// Read a cookie from the request `Cookie` headers. Empty values count as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
