//! Tags directory and tag metadata.

use super::CurrentUser;
use crate::error::ApiResult;
use crate::http::AppState;
use crate::services::tags::{self, TagInfo, TagSort};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tags", get(directory))
        .route("/api/tags/search", get(search))
        .route("/api/tags/:tag/meta", get(metadata))
}

#[derive(Debug, Deserialize)]
struct DirectoryQuery {
    #[serde(default)]
    tab: String,
}

async fn directory(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<Json<Value>> {
    let sort = TagSort::parse(&query.tab);
    let tags = tags::directory(&state.db, sort).await?;
    Ok(Json(json!({ "tags": tags, "tab": sort })))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    w: String,
}

async fn search(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let tags = tags::search(&state.db, &query.w).await?;
    Ok(Json(json!({ "tags": tags })))
}

async fn metadata(_current: CurrentUser, Path(tag): Path<String>) -> Json<TagInfo> {
    Json(tags::tag_metadata(&tag))
}
