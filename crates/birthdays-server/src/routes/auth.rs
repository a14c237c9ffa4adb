use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use birthdays_core::users::Role;
use birthdays_core::BirthdaysError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, Claims};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InviteRequest {
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// An empty body reads as `{}`; anything else must be a JSON object of the
/// expected shape.
fn json_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|_| AppError::bad_request("Invalid JSON"))
}

fn field(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Signing key for new sessions. `None` under `AUTH_DISABLED`, where no
/// cookie is issued.
fn session_secret(app: &AppState) -> Result<Option<String>, AppError> {
    let cfg = &app.config.auth;
    if cfg.disabled {
        return Ok(None);
    }
    cfg.secret
        .clone()
        .map(Some)
        .ok_or_else(|| AppError(anyhow::anyhow!("Missing AUTH_SECRET")))
}

fn session_response(
    app: &AppState,
    secret: Option<&str>,
    username: &str,
    role: Role,
    status: StatusCode,
) -> Response {
    let body = Json(json!({ "ok": true, "role": role }));
    let Some(secret) = secret else {
        return (status, body).into_response();
    };
    let cfg = &app.config.auth;
    let now = chrono::Utc::now().timestamp();
    let token = auth::sign_token(secret, &Claims::new(username, role, now, cfg.token_ttl_seconds));
    let cookie = auth::session_cookie(&token, cfg.token_ttl_seconds, cfg.cookie_secure);
    (status, [(header::SET_COOKIE, cookie)], body).into_response()
}

/// POST /auth/login — exchange a username and password for a session cookie.
///
/// On an empty user book, `admin` with `ADMIN_INITIAL_PASSWORD` creates the
/// first admin account.
pub async fn login(State(app): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: LoginRequest = json_body(&body)?;
    let (username, password) = (field(req.username), field(req.password));
    if username.is_empty() || password.is_empty() {
        return Err(AppError::bad_request("username and password required"));
    }

    if app.config.auth.disabled {
        return Ok(Json(json!({ "ok": true, "role": Role::Admin })).into_response());
    }
    let secret = session_secret(&app)?;

    let initial = app.config.auth.admin_initial_password.clone();
    let (u, p) = (username.clone(), password);
    let role = app
        .mutate_users(move |book| {
            if book.bootstrap_admin(&u, &p, initial.as_deref()) {
                tracing::info!("first admin account created");
                return Ok(Some(Role::Admin));
            }
            Ok(book.authenticate(&u, &p))
        })
        .await?;

    let Some(role) = role else {
        tracing::warn!(%username, "login rejected");
        return Err(AppError::unauthorized("Invalid credentials"));
    };
    tracing::info!(%username, ?role, "logged in");
    Ok(session_response(&app, secret.as_deref(), &username, role, StatusCode::OK))
}

/// POST /auth/logout — expire the session cookie.
pub async fn logout(State(app): State<AppState>) -> Response {
    let cookie = auth::clear_cookie(app.config.auth.cookie_secure);
    ([(header::SET_COOKIE, cookie)], Json(json!({ "ok": true }))).into_response()
}

/// POST /auth/invite — admin only: issue a one-time registration token.
pub async fn invite(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let now = chrono::Utc::now().timestamp();
    let is_admin = auth::session_from_headers(&app.config.auth, &headers, now)
        .is_some_and(|s| s.is_admin());
    if !is_admin {
        return Err(AppError::forbidden("Forbidden"));
    }

    let req: InviteRequest = json_body(&body)?;
    let role = Role::parse_lenient(req.role.as_deref());
    let token = app
        .mutate_users(move |book| Ok(book.create_invite(role, now)))
        .await?;
    tracing::info!(?role, "invite created");
    Ok(Json(json!({ "ok": true, "token": token })).into_response())
}

/// POST /auth/register — redeem an invite, create the account and log it in.
pub async fn register(State(app): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: RegisterRequest = json_body(&body)?;
    let (token, username, password) = (field(req.token), field(req.username), field(req.password));
    if token.is_empty() || username.is_empty() || password.is_empty() {
        return Err(AppError::bad_request(
            "token, username and password are required",
        ));
    }
    let secret = session_secret(&app)?;

    let u = username.clone();
    let role = app
        .mutate_users(move |book| {
            if !book.invites.contains_key(&token) {
                return Err(BirthdaysError::InvalidInvite);
            }
            if book.users.contains_key(&u) {
                return Err(BirthdaysError::UserExists);
            }
            let invite = book
                .consume_invite(&token)
                .ok_or(BirthdaysError::InvalidInvite)?;
            book.create_user(&u, &password, invite.role)?;
            Ok(invite.role)
        })
        .await?;

    tracing::info!(%username, ?role, "account registered");
    Ok(session_response(&app, secret.as_deref(), &username, role, StatusCode::CREATED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_reads_as_empty_object() {
        let req: LoginRequest = json_body(b"  ").unwrap();
        assert!(req.username.is_none());
    }

    #[test]
    fn malformed_body_is_invalid_json() {
        let err = json_body::<LoginRequest>(b"{username:").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.0.to_string(), "Invalid JSON");
        assert!(json_body::<LoginRequest>(b"[1,2]").is_err());
    }

    #[test]
    fn fields_are_trimmed() {
        assert_eq!(field(Some("  kim ".into())), "kim");
        assert_eq!(field(None), "");
    }
}
