use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use birthdays_core::calendar::{self, ViewQuery};
use birthdays_core::codec;
use birthdays_core::github::PublishMessages;
use birthdays_core::record::{self, Record};
use birthdays_core::BirthdaysError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// Parse a request body as a single record. Validation happens separately.
pub(crate) fn person_from_body(body: &[u8]) -> Result<Record, AppError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| AppError::bad_request("Invalid JSON"))?;
    Ok(Record::from_json(&value)?)
}

fn list_body(rows: &[Record]) -> Value {
    json!({ "data": rows, "count": rows.len() })
}

/// Publish the new list when publish-on-change is enabled. The mutation has
/// already been saved; a failed publish only adds a warning.
async fn publish_if_enabled(app: &AppState, rows: &[Record], body: &mut Value) {
    if !app.config.publish_on_change {
        return;
    }
    let result = match codec::to_csv_file(rows) {
        Ok(csv) => {
            let messages = PublishMessages::for_file(&app.config.github.file_path);
            app.github.publish_csv(&csv, &messages).await
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(outcome) => body["pr_url"] = json!(outcome.pr_url),
        Err(e) => {
            tracing::warn!(error = %e, "publish after change failed");
            body["pr_url"] = Value::Null;
            body["warning"] = json!(format!("PR creation failed: {e}"));
        }
    }
}

async fn mutation_response(app: &AppState, status: StatusCode, rows: Vec<Record>) -> Response {
    let mut body = list_body(&rows);
    publish_if_enabled(app, &rows, &mut body).await;
    (status, Json(body)).into_response()
}

/// GET /people — every stored record in order.
pub async fn list_people(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let rows = app.load().await?;
    Ok(Json(list_body(&rows)))
}

/// POST /people — validate and append one record.
pub async fn create_person(State(app): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let person = person_from_body(&body)?;
    person.validate()?;
    let (rows, ()) = app
        .mutate(move |rows| {
            rows.push(person);
            Ok(())
        })
        .await?;
    tracing::info!(count = rows.len(), "record added");
    Ok(mutation_response(&app, StatusCode::CREATED, rows).await)
}

/// GET /people/:index — one record by position.
pub async fn get_person(
    State(app): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let index = record::parse_index(&raw)?;
    let rows = app.load().await?;
    Ok(match record::get(&rows, index) {
        Ok(row) => Json(json!({ "ok": true, "index": index, "data": row })).into_response(),
        Err(BirthdaysError::IndexOutOfRange { index, count }) => out_of_range(index, count),
        Err(e) => return Err(e.into()),
    })
}

pub(crate) fn out_of_range(index: usize, count: usize) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "ok": false,
            "error": "Index out of range",
            "index": index,
            "count": count,
        })),
    )
        .into_response()
}

/// PUT /people/:index — validate and replace one record.
pub async fn update_person(
    State(app): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let index = record::parse_index(&raw)?;
    let person = person_from_body(&body)?;
    person.validate()?;
    let (rows, ()) = app
        .mutate(move |rows| record::replace(rows, index, &person))
        .await?;
    tracing::info!(index, "record updated");
    Ok(mutation_response(&app, StatusCode::OK, rows).await)
}

/// DELETE /people/:index — remove one record.
pub async fn delete_person(
    State(app): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let index = record::parse_index(&raw)?;
    let (rows, _removed) = app.mutate(move |rows| record::remove(rows, index)).await?;
    tracing::info!(index, "record deleted");
    Ok(mutation_response(&app, StatusCode::OK, rows).await)
}

#[derive(Debug, Deserialize)]
pub struct OverrideQuery {
    pub method: Option<String>,
}

/// POST /people/:index — verb tunnelled through `X-HTTP-Method-Override` or
/// `?method=`. `DELETE` deletes; anything else updates.
pub async fn override_person(
    State(app): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<OverrideQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let method = headers
        .get(METHOD_OVERRIDE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.method)
        .unwrap_or_else(|| "PUT".to_string());

    if method.trim().eq_ignore_ascii_case("DELETE") {
        delete_person(State(app), Path(raw)).await
    } else {
        update_person(State(app), Path(raw), body).await
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    pub period: Option<String>,
    pub modulo: Option<String>,
    pub sort: Option<String>,
}

/// GET /people/view — filtered and sorted table rows with derived columns.
pub async fn view_people(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<Value>, AppError> {
    let query = ViewQuery::parse(
        params.period.as_deref(),
        params.modulo.as_deref(),
        params.sort.as_deref(),
    )?;
    let today = chrono::Local::now().date_naive();
    let rows = app.load().await?;
    let data = calendar::view(&rows, &query, today);
    Ok(Json(json!({
        "count": data.len(),
        "data": data,
        "period": query.period,
        "range": calendar::period_range(query.period, today),
    })))
}
