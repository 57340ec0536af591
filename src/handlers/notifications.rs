//! Notification inbox.

use super::CurrentUser;
use crate::db::UnreadCounts;
use crate::error::ApiResult;
use crate::http::AppState;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

/// Rows shown in each inbox list.
const INBOX_LIMIT: i64 = 50;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list).delete(delete_all))
        .route("/api/notifications/counts", get(counts))
        .route("/api/notifications/read-all", post(read_all))
        .route("/api/notifications/private", get(list_private))
        .route("/api/notifications/private/read-all", post(read_all_private))
        .route("/api/notifications/:id", delete(delete_one))
}

async fn list(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Json<Value>> {
    let notifications = state.db.notifications();
    let items = notifications.list(current.id(), INBOX_LIMIT).await?;
    let unread = notifications.unread_counts(current.id()).await?;
    Ok(Json(json!({ "notifications": items, "unread": unread })))
}

async fn list_private(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<Value>> {
    let items = state
        .db
        .notifications()
        .list_private(current.id(), INBOX_LIMIT)
        .await?;
    Ok(Json(json!({ "notifications": items })))
}

async fn counts(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<UnreadCounts>> {
    Ok(Json(state.db.notifications().unread_counts(current.id()).await?))
}

async fn read_all(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Json<Value>> {
    let updated = state.db.notifications().mark_all_read(current.id()).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

async fn read_all_private(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<Value>> {
    let updated = state
        .db
        .notifications()
        .mark_all_private_read(current.id())
        .await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

async fn delete_one(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.db.notifications().delete(current.id(), id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_all(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Json<Value>> {
    let deleted = state.db.notifications().delete_all(current.id()).await?;
    Ok(Json(json!({ "success": true, "deleted_count": deleted })))
}
