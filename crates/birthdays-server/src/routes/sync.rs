//! Pull the committed CSV from the base branch into the local store.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use birthdays_core::codec;
use birthdays_core::record::{self, Record};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::constant_time_eq;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    pub token: Option<String>,
}

/// Every token the request presents: `Authorization: Bearer`,
/// `X-Bootstrap-Token` and `?token=`.
fn presented_tokens(headers: &HeaderMap, query: &SyncQuery) -> Vec<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    [
        header("authorization").and_then(|v| v.strip_prefix("Bearer ")),
        header("x-bootstrap-token"),
        query.token.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(|t| t.trim().to_string())
    .filter(|t| !t.is_empty())
    .collect()
}

/// Accept if any presented token matches. Every candidate is compared.
fn authorize(app: &AppState, headers: &HeaderMap, query: &SyncQuery) -> Result<(), AppError> {
    let Some(expected) = app.config.auth.bootstrap_token.as_deref() else {
        return Err(AppError::unauthorized("Unauthorized"));
    };
    let matched = presented_tokens(headers, query)
        .iter()
        .fold(false, |acc, given| constant_time_eq(expected, given) | acc);
    if matched {
        Ok(())
    } else {
        Err(AppError::unauthorized("Unauthorized"))
    }
}

async fn fetch_rows(app: &AppState) -> Result<Vec<Record>, Response> {
    let fetched = match app.github.fetch_file().await {
        Ok(text) => codec::parse_csv(&text),
        Err(e) => Err(e),
    };
    fetched.map_err(|e| {
        tracing::warn!(error = %e, "sync fetch failed");
        AppError::bad_request(e.to_string()).into_response()
    })
}

fn summary(app: &AppState, count: usize) -> Value {
    let gh = &app.config.github;
    json!({
        "ok": true,
        "github_owner": gh.owner,
        "github_repo": gh.repo,
        "github_branch": gh.base_branch,
        "github_file_path": gh.file_path,
        "count": count,
    })
}

/// GET /sync — dry run: report how many rows the committed file holds.
pub async fn sync_preview(
    State(app): State<AppState>,
    Query(query): Query<SyncQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    authorize(&app, &headers, &query)?;
    let rows = match fetch_rows(&app).await {
        Ok(rows) => rows,
        Err(resp) => return Ok(resp),
    };
    Ok(Json(summary(&app, rows.len())).into_response())
}

/// POST /sync — overwrite the store with the committed file.
pub async fn sync_apply(
    State(app): State<AppState>,
    Query(query): Query<SyncQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    authorize(&app, &headers, &query)?;
    let rows = match fetch_rows(&app).await {
        Ok(rows) => rows,
        Err(resp) => return Ok(resp),
    };
    record::validate_all(&rows)?;
    let count = rows.len();
    app.replace_all(rows).await?;
    tracing::info!(count, "store synced from repository");

    let mut body = summary(&app, count);
    body["written"] = json!(count);
    Ok(Json(body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use birthdays_core::config::Config;
    use birthdays_core::store::MemoryStore;
    use std::sync::Arc;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, v.parse().unwrap());
        }
        h
    }

    #[test]
    fn collects_every_source() {
        let q = SyncQuery {
            token: Some("q".into()),
        };
        let h = headers(&[("authorization", "Bearer b"), ("x-bootstrap-token", "x")]);
        assert_eq!(presented_tokens(&h, &q), ["b", "x", "q"]);
        assert_eq!(presented_tokens(&HeaderMap::new(), &q), ["q"]);
    }

    fn app_expecting(token: Option<&str>) -> AppState {
        let mut config = Config::default();
        config.auth.bootstrap_token = token.map(str::to_string);
        AppState::new(config, Arc::new(MemoryStore::default())).unwrap()
    }

    #[test]
    fn any_matching_source_authorizes() {
        let app = app_expecting(Some("right"));
        let none = SyncQuery { token: None };
        let h = headers(&[
            ("authorization", "Bearer user-session"),
            ("x-bootstrap-token", "right"),
        ]);
        assert!(authorize(&app, &h, &none).is_ok());

        let query = SyncQuery {
            token: Some("right".into()),
        };
        let h = headers(&[("authorization", "Bearer wrong")]);
        assert!(authorize(&app, &h, &query).is_ok());

        let h = headers(&[("authorization", "Bearer wrong"), ("x-bootstrap-token", "nope")]);
        assert!(authorize(&app, &h, &none).is_err());
    }

    #[test]
    fn unset_token_rejects_everything() {
        let app = app_expecting(None);
        let query = SyncQuery {
            token: Some(String::new()),
        };
        assert!(authorize(&app, &HeaderMap::new(), &query).is_err());
    }

    #[test]
    fn non_bearer_authorization_ignored() {
        let q = SyncQuery { token: None };
        let h = headers(&[("authorization", "Basic abc")]);
        assert!(presented_tokens(&h, &q).is_empty());
    }
}
