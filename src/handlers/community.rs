//! Communities: directory, lifecycle, membership and join requests.

use super::upload::{FormData, discard_on_error, store_optional};
use super::{CurrentUser, PageQuery};
use crate::db::{
    Community, CommunityDetail, CommunityInput, CommunityListing, JoinOutcome, MemberRole,
    MembersPage,
};
use crate::error::{ApiError, ApiResult};
use crate::http::AppState;
use crate::services::MediaKind;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/communities", get(list).post(create))
        .route("/api/communities/mine", get(my_communities))
        .route(
            "/api/communities/:slug",
            get(detail).post(edit).delete(delete_community),
        )
        .route("/api/communities/:slug/join", post(join))
        .route("/api/communities/:slug/leave", post(leave))
        .route("/api/communities/:slug/requests", get(join_requests))
        .route(
            "/api/communities/:slug/requests/:request_id/:decision",
            post(review_request),
        )
        .route("/api/communities/:slug/members", get(members))
        .route(
            "/api/communities/:slug/members/:user_id",
            delete(remove_member),
        )
        .route(
            "/api/communities/:slug/members/:user_id/role",
            post(change_role),
        )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    q: Option<String>,
    page: Option<i64>,
}

async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<CommunityListing>> {
    let listing = state
        .db
        .communities()
        .list(
            current.id(),
            query.q.as_deref(),
            query.page,
            state.config.limits.communities_per_page,
        )
        .await?;
    Ok(Json(listing))
}

async fn my_communities(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let communities = state
        .db
        .communities()
        .my_communities(
            current.id(),
            query.page,
            state.config.limits.communities_per_page,
        )
        .await?;
    Ok(Json(json!({ "communities": communities })))
}

async fn detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<CommunityDetail>> {
    let detail = state
        .db
        .communities()
        .detail(current.id(), &slug, state.config.limits.detail_members)
        .await?;
    Ok(Json(detail))
}

/// Multipart: `name`, `description`, `is_private`, optional `icon` and
/// `banner` images. Images are stored only once the caller is authorized.
async fn read_input(state: &AppState, mut form: FormData) -> ApiResult<CommunityInput> {
    let icon = store_optional(&state.media, &mut form, "icon", MediaKind::CommunityIcon).await?;
    let banner =
        match store_optional(&state.media, &mut form, "banner", MediaKind::CommunityBanner).await {
            Ok(banner) => banner,
            Err(e) => return discard_on_error(&state.media, Err(e), &[icon.as_deref()]).await,
        };
    Ok(CommunityInput {
        name: form.text("name").unwrap_or_default().to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        is_private: form.flag("is_private"),
        icon,
        banner,
    })
}

fn stored_images(input: &CommunityInput) -> [Option<&str>; 2] {
    [input.icon.as_deref(), input.banner.as_deref()]
}

async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Community>)> {
    let input = read_input(&state, FormData::read(multipart).await?).await?;
    let community = discard_on_error(
        &state.media,
        state.db.communities().create(current.id(), &input).await,
        &stored_images(&input),
    )
    .await?;
    info!(community = %community.slug, creator_id = current.id(), "Community created");
    Ok((StatusCode::CREATED, Json(community)))
}

async fn edit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slug): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let form = FormData::read(multipart).await?;
    let communities = state.db.communities();
    communities.ensure_editor(current.id(), &slug).await?;

    let input = read_input(&state, form).await?;
    let community = discard_on_error(
        &state.media,
        communities.edit(current.id(), &slug, &input).await,
        &stored_images(&input),
    )
    .await?;
    Ok(Json(json!({ "success": true, "community": community })))
}

async fn delete_community(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .communities()
        .delete(&current.actor(), &slug)
        .await?;
    info!(community = %slug, user_id = current.id(), "Community deleted");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct JoinForm {
    message: Option<String>,
}

async fn join(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slug): Path<String>,
    form: Option<Json<JoinForm>>,
) -> ApiResult<Json<Value>> {
    let message = form.and_then(|Json(form)| form.message);
    let outcome = state
        .db
        .communities()
        .join(current.id(), &slug, message.as_deref())
        .await?;
    let message = match outcome {
        JoinOutcome::Joined => "You joined the community.",
        JoinOutcome::Requested => "Your join request has been sent.",
    };
    Ok(Json(json!({
        "success": true,
        "outcome": outcome,
        "message": message,
    })))
}

async fn leave(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<Value>> {
    state.db.communities().leave(current.id(), &slug).await?;
    Ok(Json(json!({ "success": true })))
}

async fn join_requests(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<Value>> {
    let requests = state
        .db
        .communities()
        .join_requests(current.id(), &slug)
        .await?;
    Ok(Json(json!({ "requests": requests })))
}

async fn review_request(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((slug, request_id, decision)): Path<(String, i64, String)>,
) -> ApiResult<Json<Value>> {
    let approve = match decision.as_str() {
        "approve" => true,
        "reject" => false,
        _ => return Err(ApiError::bad_request("Decision must be approve or reject.")),
    };
    let request = state
        .db
        .communities()
        .review_request(current.id(), &slug, request_id, approve)
        .await?;
    Ok(Json(json!({ "success": true, "request": request })))
}

async fn members(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<MembersPage>> {
    let page = state
        .db
        .communities()
        .members(
            current.id(),
            &slug,
            query.page,
            state.config.limits.members_per_page,
        )
        .await?;
    Ok(Json(page))
}

async fn remove_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((slug, user_id)): Path<(String, i64)>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .communities()
        .remove_member(current.id(), &slug, user_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct RoleForm {
    role: String,
}

async fn change_role(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((slug, user_id)): Path<(String, i64)>,
    Json(form): Json<RoleForm>,
) -> ApiResult<Json<Value>> {
    let role = MemberRole::parse(&form.role)
        .ok_or_else(|| ApiError::Validation("Invalid role".to_string()))?;
    let member = state
        .db
        .communities()
        .change_role(current.id(), &slug, user_id, role)
        .await?;
    Ok(Json(json!({ "success": true, "member": member })))
}
