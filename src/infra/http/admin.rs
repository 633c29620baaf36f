//! Management routes: `/keys`, `/clear`, `/size`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::info;

use crate::{
    application::{error::HttpError, intercept::parse_tag_list},
    cache::{CacheEntry, CacheSize, Tag},
};

use super::AppState;

const SOURCE: &str = "infra::http::admin";
const TARGET: &str = "tagcache::http::admin";

pub(super) async fn list_keys(State(state): State<AppState>) -> Response {
    render_entries(state.store.entries())
}

pub(super) async fn list_tagged(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, HttpError> {
    let tags = parse_path_tags(&state, path)?;
    let entries = if tags.is_empty() {
        state.store.entries()
    } else {
        state.store.filter(&tags)
    };
    Ok(render_entries(entries))
}

pub(super) async fn flush_keys() -> Json<serde_json::Value> {
    Json(json!({}))
}

pub(super) async fn flush_tagged(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let tags = parse_path_tags(&state, path)?;
    if !tags.is_empty() {
        let report = state.store.flush(&tags);
        info!(
            target: TARGET,
            tags = tags.len(),
            entries_removed = report.entries_removed,
            "flushed tags via management api"
        );
    }
    Ok(Json(json!({})))
}

pub(super) async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, Json(json!({}))).into_response()
}

pub(super) async fn clear(State(state): State<AppState>) -> Json<serde_json::Value> {
    let before = state.store.size();
    state.store.clear();
    info!(
        target: TARGET,
        requests = before.requests,
        keys = before.keys,
        "cleared cache"
    );
    Json(json!({ "status": "ok" }))
}

pub(super) async fn size(State(state): State<AppState>) -> Json<CacheSize> {
    Json(state.store.size())
}

fn render_entries(entries: Vec<Arc<CacheEntry>>) -> Response {
    let entries: Vec<&CacheEntry> = entries.iter().map(Arc::as_ref).collect();
    Json(entries).into_response()
}

/// The path segment is percent-decoded by the extractor before parsing.
fn parse_path_tags(
    state: &AppState,
    path: Result<Path<String>, PathRejection>,
) -> Result<Vec<Tag>, HttpError> {
    let Path(raw) = path.map_err(|rejection| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            json!({ "msg": "Errors parsing keys" }),
            &rejection,
        )
    })?;

    parse_tag_list(&raw, state.config.key_order).map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            json!({ "msg": "Errors parsing keys" }),
            &err,
        )
    })
}
