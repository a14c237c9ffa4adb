//! `/api/people` proxy onto the backend data routes.
//!
//! Some hosts reject `PUT` and `DELETE` outright, so writes to a single record
//! always travel as `POST` with the verb in `X-HTTP-Method-Override`, walking
//! an ordered list of targets until one of them accepts the request.

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
};
use birthdays_core::record::lenient_int;
use serde::Serialize;
use serde_json::{json, Value};

use crate::routes::people::{OverrideQuery, METHOD_OVERRIDE_HEADER};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const FORWARDED_HEADERS: &[&str] = &[
    "accept",
    "content-type",
    "authorization",
    "cookie",
    "x-forwarded-for",
];

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Upstream bodies kept per attempt in the all-targets-failed report.
const DIAGNOSTIC_BODY_CHARS: usize = 400;

const ALL_TARGETS_NOTE: &str = "Hosts may block PUT/DELETE or strip override hints. \
     We tried multiple targets via POST with X-HTTP-Method-Override.";

// ---------------------------------------------------------------------------
// Upstream plumbing
// ---------------------------------------------------------------------------

struct Upstream {
    status: StatusCode,
    content_type: Option<String>,
    body: Bytes,
}

fn forward_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(*name) {
            out.insert(*name, value.clone());
        }
    }
    out
}

async fn send(
    app: &AppState,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Option<Bytes>,
) -> Result<Upstream, reqwest::Error> {
    let mut req = app.http_client.request(method, url).headers(headers);
    if let Some(body) = body {
        req = req.body(body);
    }
    let resp = req.send().await?;
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.bytes().await?;
    Ok(Upstream {
        status,
        content_type,
        body,
    })
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Body>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Body::empty());
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

fn json_response(status: StatusCode, value: &Value) -> Response {
    respond(status, JSON_CONTENT_TYPE, value.to_string())
}

/// Pass an upstream reply through with its status and content type.
fn mirror(upstream: Upstream) -> Response {
    let content_type = upstream
        .content_type
        .unwrap_or_else(|| JSON_CONTENT_TYPE.to_string());
    respond(upstream.status, &content_type, upstream.body)
}

fn proxy_failed(detail: impl std::fmt::Display) -> Response {
    tracing::warn!(%detail, "people proxy failed");
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &json!({ "ok": false, "error": "people_proxy_failed", "detail": detail.to_string() }),
    )
}

fn invalid_index() -> Response {
    json_response(
        StatusCode::BAD_REQUEST,
        &json!({ "ok": false, "error": "Invalid index" }),
    )
}

/// Leading non-negative integer of the path segment.
fn parse_proxy_index(raw: &str) -> Option<usize> {
    lenient_int(raw).and_then(|i| usize::try_from(i).ok())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// OPTIONS on any proxy route.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET|POST /api/people — forwarded verbatim, query string included.
pub async fn proxy_collection(
    State(app): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = match query {
        Some(q) if !q.is_empty() => format!("{}/people?{q}", app.backend_url),
        _ => format!("{}/people", app.backend_url),
    };
    let body = (method == Method::POST).then_some(body);
    match send(&app, method, &url, forward_headers(&headers), body).await {
        Ok(upstream) => mirror(upstream),
        Err(e) => proxy_failed(e),
    }
}

/// GET /api/people/:index — fetch the whole list and pick the row here.
pub async fn proxy_get_person(
    State(app): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(index) = parse_proxy_index(&raw) else {
        return invalid_index();
    };
    let url = format!("{}/people", app.backend_url);
    let upstream = match send(&app, Method::GET, &url, forward_headers(&headers), None).await {
        Ok(u) => u,
        Err(e) => return proxy_failed(e),
    };

    if !upstream.status.is_success() {
        if upstream.body.is_empty() {
            let status = upstream.status;
            return json_response(
                status,
                &json!({ "ok": false, "status": status.as_u16(), "error": "failed_to_fetch_list" }),
            );
        }
        return mirror(upstream);
    }

    let payload: Value = serde_json::from_slice(&upstream.body).unwrap_or(Value::Null);
    let rows = payload
        .get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    match rows.get(index) {
        Some(row) => json_response(
            StatusCode::OK,
            &json!({ "ok": true, "index": index, "data": row }),
        ),
        None => json_response(
            StatusCode::NOT_FOUND,
            &json!({ "ok": false, "error": "Index out of range", "index": index, "count": rows.len() }),
        ),
    }
}

/// PUT|DELETE|POST /api/people/:index — tunnelled write with fallback targets.
pub async fn proxy_write_person(
    State(app): State<AppState>,
    method: Method,
    Path(raw): Path<String>,
    Query(query): Query<OverrideQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(index) = parse_proxy_index(&raw) else {
        return invalid_index();
    };
    let verb = resolve_verb(&method, &headers, query.method.as_deref());
    let body = (verb == Method::PUT).then_some(body);
    write_with_fallback(&app, verb, index, &headers, body).await
}

/// The verb a write stands for. A `POST` reads its override hint and
/// defaults to `PUT`.
fn resolve_verb(method: &Method, headers: &HeaderMap, query_method: Option<&str>) -> Method {
    if *method == Method::PUT || *method == Method::DELETE {
        return method.clone();
    }
    let hint = headers
        .get(METHOD_OVERRIDE_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query_method)
        .unwrap_or("PUT");
    if hint.trim().eq_ignore_ascii_case("DELETE") {
        Method::DELETE
    } else {
        Method::PUT
    }
}

/// Ordered targets for a tunnelled write.
pub fn fallback_targets(backend: &str, index: usize, verb: &Method) -> Vec<String> {
    vec![
        format!("{backend}/people/{index}?method={verb}"),
        format!("{backend}/people/{index}"),
    ]
}

#[derive(Debug, Serialize)]
struct Attempt {
    url: String,
    status: u16,
    body: String,
}

async fn write_with_fallback(
    app: &AppState,
    verb: Method,
    index: usize,
    headers: &HeaderMap,
    body: Option<Bytes>,
) -> Response {
    let mut forwarded = forward_headers(headers);
    match verb.as_str().parse::<HeaderValue>() {
        Ok(value) => {
            forwarded.insert(METHOD_OVERRIDE_HEADER, value);
        }
        Err(e) => return proxy_failed(e),
    }

    let mut tried: Vec<Attempt> = Vec::new();
    for target in fallback_targets(&app.backend_url, index, &verb) {
        tracing::debug!(%target, %verb, "trying write target");
        let upstream = match send(app, Method::POST, &target, forwarded.clone(), body.clone()).await
        {
            Ok(u) => u,
            Err(e) => {
                tried.push(Attempt {
                    url: target,
                    status: 0,
                    body: format!("network_error: {e}"),
                });
                continue;
            }
        };

        if upstream.status != StatusCode::NOT_FOUND
            && upstream.status != StatusCode::METHOD_NOT_ALLOWED
        {
            if upstream.body.is_empty() && !upstream.status.is_success() {
                let status = upstream.status;
                return json_response(
                    status,
                    &json!({
                        "ok": false,
                        "status": status.as_u16(),
                        "error": "empty_error_body_from_backend",
                        "target": target,
                    }),
                );
            }
            return mirror(upstream);
        }

        tried.push(Attempt {
            url: target,
            status: upstream.status.as_u16(),
            body: String::from_utf8_lossy(&upstream.body)
                .chars()
                .take(DIAGNOSTIC_BODY_CHARS)
                .collect(),
        });
    }

    let status = tried
        .last()
        .map(|a| a.status)
        .filter(|s| *s != 0)
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    tracing::warn!(index, %verb, attempts = tried.len(), "all write targets failed");
    json_response(
        status,
        &json!({
            "ok": false,
            "error": "all_targets_failed",
            "note": ALL_TARGETS_NOTE,
            "tried": tried,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_in_order() {
        let t = fallback_targets("http://b", 3, &Method::DELETE);
        assert_eq!(
            t,
            vec![
                "http://b/people/3?method=DELETE".to_string(),
                "http://b/people/3".to_string(),
            ]
        );
    }

    #[test]
    fn proxy_index_parsing() {
        assert_eq!(parse_proxy_index("4"), Some(4));
        assert_eq!(parse_proxy_index("4abc"), Some(4));
        assert_eq!(parse_proxy_index("-1"), None);
        assert_eq!(parse_proxy_index("x"), None);
    }

    #[test]
    fn verb_resolution() {
        let empty = HeaderMap::new();
        assert_eq!(resolve_verb(&Method::PUT, &empty, None), Method::PUT);
        assert_eq!(resolve_verb(&Method::DELETE, &empty, None), Method::DELETE);
        assert_eq!(resolve_verb(&Method::POST, &empty, None), Method::PUT);
        assert_eq!(
            resolve_verb(&Method::POST, &empty, Some("delete")),
            Method::DELETE
        );
        let mut h = HeaderMap::new();
        h.insert(METHOD_OVERRIDE_HEADER, "DELETE".parse().unwrap());
        assert_eq!(resolve_verb(&Method::POST, &h, Some("put")), Method::DELETE);
    }

    #[test]
    fn only_whitelisted_headers_forwarded() {
        let mut h = HeaderMap::new();
        h.insert("cookie", "auth=x".parse().unwrap());
        h.insert("host", "example.com".parse().unwrap());
        h.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        let out = forward_headers(&h);
        assert_eq!(out.len(), 2);
        assert!(out.get("host").is_none());
    }
}
