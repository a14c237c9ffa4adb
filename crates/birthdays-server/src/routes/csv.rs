use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use birthdays_core::codec;
use birthdays_core::github::PublishMessages;
use birthdays_core::record::{self, Record};
use birthdays_core::BirthdaysError;
use serde_json::{json, Value};

use crate::auth::Session;
use crate::error::AppError;
use crate::state::AppState;

/// GET /csv — the stored list as CSV text.
pub async fn get_csv(State(app): State<AppState>) -> Response {
    let text = match app.load().await {
        Ok(rows) => codec::to_csv_file(&rows),
        Err(e) => {
            tracing::warn!(error = %e.0, "loading records for csv failed");
            return (StatusCode::NOT_FOUND, "CSV not found").into_response();
        }
    };
    match text {
        Ok(text) => ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], text).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Decode a bulk payload by content type. JSON must be an array of rows or
/// `{data: [...]}`. Any other content type is read as CSV text on a best-effort
/// basis, and a too-short body there is an unsupported payload rather than a
/// bad CSV.
fn rows_from_body(headers: &HeaderMap, body: &[u8]) -> Result<Vec<Record>, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.contains("application/json") {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| AppError::bad_request("Invalid JSON"))?;
        return Ok(record::records_from_json(&value)?);
    }

    let text = String::from_utf8_lossy(body);
    if !codec::is_plausible_payload(&text) {
        if content_type.contains("text/csv") {
            return Err(BirthdaysError::InvalidCsv.into());
        }
        return Err(AppError::bad_request("Unsupported payload format"));
    }
    Ok(codec::parse_csv(&text)?)
}

fn require_admin(session: &Session) -> Result<(), AppError> {
    if session.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Forbidden"))
    }
}

/// Run the publish workflow and shape the reply. Failure is reported in the
/// body with a 500, never as a silent success.
async fn publish_response(app: &AppState, rows: &[Record]) -> Response {
    let count = rows.len();
    let result = match codec::to_csv_file(rows) {
        Ok(csv) => {
            let messages = PublishMessages::for_file(&app.config.github.file_path);
            app.github.publish_csv(&csv, &messages).await
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(outcome) => Json(json!({
            "ok": true,
            "count": count,
            "pr_url": outcome.pr_url,
            "pr_number": outcome.pr_number,
            "branch": outcome.branch,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, count, "publish failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "count": count, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// POST /csv — replace the whole list from CSV or JSON, then publish.
pub async fn post_csv(
    State(app): State<AppState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    require_admin(&session)?;
    let rows = rows_from_body(&headers, &body)?;
    record::validate_all(&rows)?;
    app.replace_all(rows.clone()).await?;
    tracing::info!(count = rows.len(), by = %session.sub, "records replaced");
    Ok(publish_response(&app, &rows).await)
}

/// POST /publish — publish the stored list as it is.
pub async fn publish(
    State(app): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    require_admin(&session)?;
    let rows = app.load().await?;
    Ok(publish_response(&app, &rows).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn headers(content_type: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
        h
    }

    #[test]
    fn short_csv_rejected() {
        let err = rows_from_body(&headers("text/csv"), b"  a,b  ").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.0.to_string(), "Invalid or empty CSV");
    }

    #[test]
    fn unknown_content_type_parses_as_csv() {
        let rows = rows_from_body(&HeaderMap::new(), b"Ada,Lovelace,10,12,1815").unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn short_body_of_unknown_type_is_unsupported() {
        for h in [HeaderMap::new(), headers("text/plain")] {
            let err = rows_from_body(&h, b"a,b").unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.0.to_string(), "Unsupported payload format");
        }
    }

    #[test]
    fn json_payload_shapes() {
        let h = headers("application/json; charset=utf-8");
        let rows = rows_from_body(
            &h,
            br#"{"data":[{"first_name":"A","last_name":"B","day":1,"month":2,"year":2000}]}"#,
        )
        .unwrap();
        assert_eq!(rows[0].month, "2");

        let err = rows_from_body(&h, b"{oops").unwrap_err();
        assert_eq!(err.0.to_string(), "Invalid JSON");
        let err = rows_from_body(&h, br#""text""#).unwrap_err();
        assert_eq!(err.0.to_string(), "Unsupported payload format");
    }

    #[test]
    fn non_admin_forbidden() {
        let user = Session {
            sub: "guest".into(),
            role: Role::User,
        };
        assert_eq!(require_admin(&user).unwrap_err().status(), StatusCode::FORBIDDEN);
        assert!(require_admin(&Session::local_admin()).is_ok());
    }
}
