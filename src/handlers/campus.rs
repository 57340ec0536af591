//! Campus updates: public listing plus teacher/staff management.

use super::upload::{FormData, discard_on_error, store_optional};
use super::CurrentUser;
use crate::db::{CampusUpdate, CampusUpdateFilter, CampusUpdateInput, Category, Priority};
use crate::error::{ApiError, ApiResult};
use crate::http::AppState;
use crate::services::MediaKind;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/campus-updates", get(list).post(create))
        .route("/api/campus-updates/manage", get(manage))
        .route(
            "/api/campus-updates/:id",
            get(detail).post(edit).delete(delete_update),
        )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    search: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    priority: String,
    page: Option<i64>,
}

/// Unknown filter values are ignored rather than rejected.
async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let filter = CampusUpdateFilter {
        search: query.search.trim().to_string(),
        category: Category::parse(query.category.trim()),
        priority: Priority::parse(query.priority.trim()),
    };
    let repo = state.db.campus_updates();
    let updates = repo
        .list(&filter, query.page, state.config.limits.campus_updates_per_page)
        .await?;
    let can_post = repo.can_post(&current.actor()).await?;
    Ok(Json(json!({
        "updates": updates,
        "filter": filter,
        "can_post": can_post,
    })))
}

async fn detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<CampusUpdate>> {
    let update = state
        .db
        .campus_updates()
        .detail(&current.actor(), id)
        .await?;
    Ok(Json(update))
}

/// Multipart: `title`, `content`, `priority`, `category`, `is_published`,
/// `expiry_date` (unix seconds) and an optional `image`, stored last so a
/// rejected form leaves no file behind.
async fn read_input(state: &AppState, mut form: FormData) -> ApiResult<CampusUpdateInput> {
    let priority = match form.text("priority").map(str::trim) {
        None | Some("") => Priority::default(),
        Some(value) => Priority::parse(value)
            .ok_or_else(|| ApiError::Validation(format!("Unknown priority: {value}")))?,
    };
    let category = match form.text("category").map(str::trim) {
        None | Some("") => Category::default(),
        Some(value) => Category::parse(value)
            .ok_or_else(|| ApiError::Validation(format!("Unknown category: {value}")))?,
    };
    let expiry_date = match form.text("expiry_date").map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(
            value
                .parse::<i64>()
                .map_err(|_| ApiError::Validation("Invalid expiry date.".to_string()))?,
        ),
    };

    let image =
        store_optional(&state.media, &mut form, "image", MediaKind::CampusUpdateImage).await?;
    Ok(CampusUpdateInput {
        title: form.text("title").unwrap_or_default().to_string(),
        content: form.text("content").unwrap_or_default().to_string(),
        priority,
        category,
        is_published: form.text("is_published").is_none() || form.flag("is_published"),
        expiry_date,
        image,
    })
}

async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<CampusUpdate>)> {
    let repo = state.db.campus_updates();
    if !repo.can_post(&current.actor()).await? {
        return Err(ApiError::forbidden(
            "Only teachers and staff can post campus updates.",
        ));
    }
    let input = read_input(&state, FormData::read(multipart).await?).await?;
    let update = discard_on_error(
        &state.media,
        repo.create(&current.actor(), &input).await,
        &[input.image.as_deref()],
    )
    .await?;
    info!(update_id = update.id, author_id = current.id(), "Campus update created");
    Ok((StatusCode::CREATED, Json(update)))
}

async fn edit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let form = FormData::read(multipart).await?;
    let repo = state.db.campus_updates();
    repo.ensure_editable(&current.actor(), id).await?;

    let input = read_input(&state, form).await?;
    let update = discard_on_error(
        &state.media,
        repo.edit(&current.actor(), id, &input).await,
        &[input.image.as_deref()],
    )
    .await?;
    Ok(Json(json!({ "success": true, "update": update })))
}

async fn delete_update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .campus_updates()
        .delete(&current.actor(), id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct ManageQuery {
    #[serde(default)]
    search: String,
    page: Option<i64>,
}

async fn manage(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ManageQuery>,
) -> ApiResult<Json<Value>> {
    let updates = state
        .db
        .campus_updates()
        .manage(
            &current.actor(),
            &query.search,
            query.page,
            state.config.limits.campus_updates_per_page,
        )
        .await?;
    Ok(Json(json!({ "updates": updates, "search": query.search })))
}
