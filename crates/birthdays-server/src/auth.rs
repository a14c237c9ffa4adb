//! Session tokens and the request gate.
//!
//! A session is a compact HS256 JWT carried in the `auth` cookie. Without an
//! `AUTH_SECRET` no session can exist, so gated routes answer 401 unless
//! `AUTH_DISABLED` opts into open local access.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use birthdays_core::config::AuthConfig;

use crate::state::AppState;

pub use birthdays_core::users::{Role, ADMIN_USERNAME};

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "auth";

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(sub: impl Into<String>, role: Role, now: i64, ttl_seconds: u64) -> Self {
        Self {
            sub: sub.into(),
            role,
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
        }
    }
}

/// Identity attached to every request that passed the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub sub: String,
    pub role: Role,
}

impl Session {
    /// Used when `AUTH_DISABLED` is set.
    pub fn local_admin() -> Self {
        Self {
            sub: ADMIN_USERNAME.to_string(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

fn mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

pub fn sign_token(secret: &str, claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(JWT_HEADER);
    // Serializing a struct of strings and integers cannot fail.
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    let signing_input = format!("{header}.{payload}");
    let mut m = mac(secret);
    m.update(signing_input.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(m.finalize().into_bytes());
    format!("{signing_input}.{sig}")
}

/// Claims of a well-formed, correctly signed, unexpired token.
pub fn verify_token(secret: &str, token: &str, now: i64) -> Option<Claims> {
    let mut parts = token.split('.');
    let (header, payload, sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;
    let mut m = mac(secret);
    m.update(format!("{header}.{payload}").as_bytes());
    m.verify_slice(&sig).ok()?;

    let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
    (claims.exp > now).then_some(claims)
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ---------------------------------------------------------------------------
// Cookies
// ---------------------------------------------------------------------------

pub fn session_cookie(token: &str, max_age: u64, secure: bool) -> String {
    let secure = if secure { "Secure; " } else { "" };
    format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; {secure}Max-Age={max_age}")
}

pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

fn is_exempt(path: &str) -> bool {
    path == "/health" || path == "/sync" || path.starts_with("/auth/")
}

/// Session carried by `headers`: local admin under `AUTH_DISABLED`,
/// otherwise the claims of a valid `auth` cookie.
pub fn session_from_headers(auth: &AuthConfig, headers: &HeaderMap, now: i64) -> Option<Session> {
    if auth.disabled {
        return Some(Session::local_admin());
    }
    let secret = auth.secret.as_deref()?;
    let claims = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| cookie_value(cookies, COOKIE_NAME))
        .and_then(|token| verify_token(secret, token, now))?;
    Some(Session {
        sub: claims.sub,
        role: claims.role,
    })
}

/// Gate for every route except `/health`, `/auth/*` and `/sync`.
///
/// 1. `OPTIONS` or exempt path → passthrough
/// 2. `AUTH_DISABLED` or a valid `auth` cookie → passthrough with the session
/// 3. Otherwise, including when no `AUTH_SECRET` is set → 401
///    `{"error":"Unauthorized"}`
pub async fn auth_middleware(State(app): State<AppState>, mut req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS || is_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    let now = chrono::Utc::now().timestamp();
    match session_from_headers(&app.config.auth, req.headers(), now) {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => Response::builder()
            .status(401)
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"error":"Unauthorized"}"#))
            .expect("infallible: all header values are valid ASCII"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";
    const NOW: i64 = 1_700_000_000;

    fn admin_token(ttl: u64) -> String {
        sign_token(SECRET, &Claims::new("admin", Role::Admin, NOW, ttl))
    }

    #[test]
    fn token_round_trips() {
        let claims = verify_token(SECRET, &admin_token(60), NOW + 1).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp, NOW + 60);
    }

    #[test]
    fn expired_token_rejected() {
        assert!(verify_token(SECRET, &admin_token(60), NOW + 60).is_none());
    }

    #[test]
    fn wrong_secret_rejected() {
        assert!(verify_token("other", &admin_token(60), NOW).is_none());
    }

    #[test]
    fn tampered_payload_rejected() {
        let token = admin_token(60);
        let parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims::new("mallory", Role::Admin, NOW, 9999)).unwrap(),
        );
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);
        assert!(verify_token(SECRET, &tampered, NOW).is_none());
    }

    #[test]
    fn malformed_tokens_rejected() {
        for bad in ["", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(verify_token(SECRET, bad, NOW).is_none(), "{bad}");
        }
    }

    #[test]
    fn cookie_shape() {
        assert_eq!(
            session_cookie("tok", 60, false),
            "auth=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
        assert_eq!(
            clear_cookie(true),
            "auth=; Path=/; HttpOnly; SameSite=Lax; Secure; Max-Age=0"
        );
    }

    #[test]
    fn cookie_lookup_by_name() {
        assert_eq!(cookie_value("a=1; auth=xyz; b=2", "auth"), Some("xyz"));
        assert_eq!(cookie_value("oauth=1", "auth"), None);
    }

    #[test]
    fn password_compare() {
        assert!(constant_time_eq("hunter2", "hunter2"));
        assert!(!constant_time_eq("hunter2", "hunter3"));
        assert!(!constant_time_eq("short", "longer value"));
    }

    #[test]
    fn session_needs_secret_unless_disabled() {
        let token = admin_token(60);
        let mut headers = HeaderMap::new();
        headers.insert("cookie", format!("auth={token}").parse().unwrap());

        let no_secret = AuthConfig::default();
        assert_eq!(session_from_headers(&no_secret, &headers, NOW), None);
        assert_eq!(session_from_headers(&no_secret, &HeaderMap::new(), NOW), None);

        let secured = AuthConfig {
            secret: Some(SECRET.into()),
            ..AuthConfig::default()
        };
        let session = session_from_headers(&secured, &headers, NOW).unwrap();
        assert!(session.is_admin());
        assert_eq!(session_from_headers(&secured, &HeaderMap::new(), NOW), None);

        let open = AuthConfig {
            disabled: true,
            ..AuthConfig::default()
        };
        assert_eq!(
            session_from_headers(&open, &HeaderMap::new(), NOW),
            Some(Session::local_admin())
        );
    }

    #[test]
    fn exempt_paths() {
        assert!(is_exempt("/health"));
        assert!(is_exempt("/auth/login"));
        assert!(is_exempt("/sync"));
        assert!(!is_exempt("/people"));
        assert!(!is_exempt("/api/people"));
    }
}
