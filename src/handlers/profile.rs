//! Profile pages, profile editing and user search.

use super::upload::{FormData, discard_on_error, store};
use super::{CurrentUser, PageQuery, awarded_or_log};
use crate::db::{DbError, ProfileUpdate};
use crate::error::{ApiError, ApiResult};
use crate::http::AppState;
use crate::services::badges;
use crate::services::profile::{self, ProfileSummary};
use crate::services::{BadgeService, MediaKind};
use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

/// Rows in each activity tab of a profile.
const ACTIVITY_LIMIT: i64 = 50;
const SEARCH_LIMIT: i64 = 20;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/search", get(search_users))
        .route("/api/users/:id", get(profile_page))
        .route("/api/users/:id/activity", get(activity))
        .route("/api/users/:id/votes", get(votes))
        .route("/api/users/:id/reputation", get(reputation))
        .route("/api/users/:id/tags", get(tags))
        .route("/api/users/:id/badges", get(user_badges))
        .route("/api/users/:id/actions", get(actions))
        .route("/api/badges/:name/holders", get(badge_holders))
        .route("/api/profile", put(edit_profile))
        .route("/api/profile/badge-target", put(badge_target))
        .route("/api/profile/setup", post(edit_profile))
        .route("/api/profile/photo", post(upload_photo))
        .route("/api/profile/email", put(edit_email))
        .route("/api/profile/bookmarks", get(bookmarks))
}

async fn list_users(State(state): State<AppState>, _current: CurrentUser) -> ApiResult<Json<Value>> {
    let users = state.db.accounts().list_all().await?;
    Ok(Json(json!({ "users": users })))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn search_users(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(json!({ "users": [] })));
    }
    let users = state.db.accounts().search(q, SEARCH_LIMIT).await?;
    Ok(Json(json!({ "users": users })))
}

async fn profile_page(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<ProfileSummary>> {
    Ok(Json(profile::summary(&state.db, user_id).await?))
}

async fn activity(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let qa = state.db.qa();
    let questions = qa.by_owner(user_id, ACTIVITY_LIMIT).await?;
    let answers = qa.answers_by_owner(user_id, ACTIVITY_LIMIT).await?;
    let bounties = qa.bounties_by(user_id).await?;
    Ok(Json(json!({
        "questions": questions,
        "answers": answers,
        "bounties": bounties,
    })))
}

/// Profile tabs of deactivated or unknown users are not shown.
async fn require_active(state: &AppState, user_id: i64) -> ApiResult<()> {
    match state.db.accounts().find_by_id(user_id).await? {
        Some(user) if user.is_active => Ok(()),
        _ => Err(DbError::not_found("User").into()),
    }
}

async fn votes(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    require_active(&state, user_id).await?;
    let votes = state
        .db
        .qa()
        .cast_votes(user_id, query.page, state.config.limits.activity_per_page)
        .await?;
    Ok(Json(json!({ "votes": votes })))
}

async fn reputation(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    require_active(&state, user_id).await?;
    let ledger = state.db.reputation();
    let total = ledger.total(user_id).await?;
    let events = ledger
        .page(user_id, query.page, state.config.limits.activity_per_page)
        .await?;
    Ok(Json(json!({ "reputation": total, "events": events })))
}

async fn tags(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    require_active(&state, user_id).await?;
    let tags = profile::tag_standings(&state.db, user_id).await?;
    Ok(Json(json!({ "tags": tags })))
}

async fn user_badges(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    require_active(&state, user_id).await?;
    let awards = state.db.badges().for_user(user_id).await?;
    let targeted = state.db.accounts().profile(user_id).await?.targeted_badge;
    Ok(Json(json!({
        "badges": awards,
        "catalog": badges::CATALOG,
        "targeted_badge": targeted,
    })))
}

async fn actions(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    require_active(&state, user_id).await?;
    let actions = state
        .db
        .qa()
        .actions(user_id, query.page, state.config.limits.activity_per_page)
        .await?;
    Ok(Json(json!({ "actions": actions })))
}

/// Holders of a catalog or tag badge. Names nobody holds that are not in
/// the catalog are unknown.
async fn badge_holders(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let spec = badges::lookup(&name);
    let holders = state.db.badges().holders(&name).await?;
    if spec.is_none() && holders.is_empty() {
        return Err(DbError::not_found(format!("Badge \"{name}\"")).into());
    }
    Ok(Json(json!({
        "name": name,
        "badge": spec,
        "holder_count": holders.len(),
        "holders": holders,
    })))
}

#[derive(Debug, Deserialize)]
struct BadgeTargetForm {
    badge: Option<String>,
}

async fn badge_target(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<BadgeTargetForm>,
) -> ApiResult<Json<Value>> {
    let target = profile::set_badge_target(&state.db, current.id(), form.badge.as_deref()).await?;
    info!(user_id = current.id(), badge = ?target, "Badge target updated");
    Ok(Json(json!({ "success": true, "targeted_badge": target })))
}

async fn bookmarks(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Json<Value>> {
    let questions = state.db.qa().bookmarked_by(current.id()).await?;
    Ok(Json(json!({ "questions": questions })))
}

/// Shared by first-time setup and later edits.
async fn edit_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Value>> {
    let accounts = state.db.accounts();
    accounts.update_profile(current.id(), &update).await?;
    let profile = accounts.profile(current.id()).await?;

    let badges = awarded_or_log(
        BadgeService::new(&state.db)
            .after_profile_edit(current.id(), &profile.about_me)
            .await,
        current.id(),
    );
    info!(user_id = current.id(), "Profile updated");
    Ok(Json(json!({
        "success": true,
        "profile": profile,
        "badges_awarded": badges,
    })))
}

async fn upload_photo(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut form = FormData::read(multipart).await?;
    let upload = form
        .take_file("profile_photo")
        .ok_or_else(|| ApiError::Validation("No photo uploaded.".to_string()))?;
    let path = store(&state.media, MediaKind::ProfilePhoto, &upload).await?;
    discard_on_error(
        &state.media,
        state.db.accounts().set_profile_photo(current.id(), &path).await,
        &[Some(path.as_str())],
    )
    .await?;
    Ok(Json(json!({ "success": true, "profile_photo": path })))
}

#[derive(Debug, Deserialize)]
struct EmailForm {
    email: String,
}

/// The new address must stay within the login domains, or the user could
/// no longer sign in.
async fn edit_email(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<EmailForm>,
) -> ApiResult<Json<Value>> {
    let auth = &state.config.auth;
    let email = form.email.trim().to_lowercase();
    if !auth.email_allowed(&email) {
        return Err(ApiError::Validation(format!(
            "Email must end with one of: {}",
            auth.allowed_domains_display()
        )));
    }
    state.db.accounts().update_email(current.id(), &email).await?;
    info!(user_id = current.id(), "Email updated");
    Ok(Json(json!({ "success": true, "email": email })))
}
