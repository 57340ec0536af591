//! Private and group chats, messages and reactions.

use super::upload::{FormData, discard_on_error, store, store_optional};
use super::{CurrentUser, PageQuery};
use crate::db::{ChatKind, GroupChat, NewMessage};
use crate::error::{ApiError, ApiResult};
use crate::http::AppState;
use crate::metrics;
use crate::services::MediaKind;
use crate::telemetry::spans;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{Instrument, info, warn};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chats", get(chat_list))
        .route("/api/chats/unread", get(unread_total))
        .route("/api/chats/suggested", get(suggested))
        .route("/api/chats/open/:user_id", post(open_private))
        .route(
            "/api/chats/private/:id/messages",
            get(private_messages).post(send_private),
        )
        .route("/api/chats/private/:id/upload", post(upload_private))
        .route("/api/chats/groups", post(create_group))
        .route("/api/chats/groups/:id", get(open_group).post(update_group))
        .route(
            "/api/chats/groups/:id/messages",
            get(group_messages).post(send_group),
        )
        .route("/api/chats/groups/:id/upload", post(upload_group))
        .route("/api/chats/groups/:id/members", post(add_member))
        .route("/api/chats/groups/:id/members/:user_id", delete(remove_member))
        .route("/api/messages/:id", put(edit_message).delete(delete_message))
        .route("/api/messages/:id/react", post(react))
}

/// JSON message payloads; images and files go through the upload routes.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SendForm {
    Text { content: String },
    Link { url: String },
}

async fn chat_list(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Json<Value>> {
    let chats = state.db.chats();
    let entries = chats.chat_list(current.id()).await?;
    let suggested = chats
        .suggested_users(current.id(), state.config.limits.suggested_users)
        .await?;
    Ok(Json(json!({
        "chats": entries,
        "suggested_users": suggested,
        "unread_total": unread_or_zero(&state, current.id()).await,
    })))
}

/// The header badge must never break a page, so failures count as zero.
async fn unread_or_zero(state: &AppState, user_id: i64) -> i64 {
    match state.db.chats().unread_total(user_id).await {
        Ok(count) => count,
        Err(e) => {
            warn!(user_id, error = %e, "Failed to count unread chat messages");
            0
        }
    }
}

async fn unread_total(State(state): State<AppState>, current: CurrentUser) -> Json<Value> {
    Json(json!({ "unread_count": unread_or_zero(&state, current.id()).await }))
}

async fn suggested(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Json<Value>> {
    let users = state
        .db
        .chats()
        .suggested_users(current.id(), state.config.limits.suggested_users)
        .await?;
    Ok(Json(json!({ "users": users })))
}

async fn open_private(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(other_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let chats = state.db.chats();
    let chat = chats.open_private(current.id(), other_id).await?;
    let messages = chats
        .messages(
            current.id(),
            ChatKind::Private,
            chat.id,
            None,
            state.config.limits.messages_per_page,
        )
        .await?;
    Ok(Json(json!({ "chat": chat, "messages": messages })))
}

async fn open_group(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(group_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let chats = state.db.chats();
    let group = chats.open_group(current.id(), group_id).await?;
    let messages = chats
        .messages(
            current.id(),
            ChatKind::Group,
            group_id,
            query.page,
            state.config.limits.messages_per_page,
        )
        .await?;
    Ok(Json(json!({ "group": group, "messages": messages })))
}

#[derive(Debug, Deserialize)]
struct GroupForm {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    member_ids: Vec<i64>,
}

async fn create_group(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<GroupForm>,
) -> ApiResult<(StatusCode, Json<GroupChat>)> {
    let group = state
        .db
        .chats()
        .create_group(
            current.id(),
            &form.name,
            form.description.as_deref(),
            &form.member_ids,
        )
        .await?;
    info!(group_id = group.id, creator_id = current.id(), "Group chat created");
    Ok((StatusCode::CREATED, Json(group)))
}

/// Multipart: optional `name` text field and optional `group_photo` file.
async fn update_group(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(group_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut form = FormData::read(multipart).await?;
    let chats = state.db.chats();
    chats.ensure_group_creator(current.id(), group_id).await?;

    let photo =
        store_optional(&state.media, &mut form, "group_photo", MediaKind::GroupPhoto).await?;
    let group = discard_on_error(
        &state.media,
        chats
            .update_group(current.id(), group_id, form.text("name"), photo.as_deref())
            .await,
        &[photo.as_deref()],
    )
    .await?;
    Ok(Json(json!({ "success": true, "group": group })))
}

#[derive(Debug, Deserialize)]
struct MemberForm {
    user_id: i64,
}

async fn add_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(group_id): Path<i64>,
    Json(form): Json<MemberForm>,
) -> ApiResult<Json<Value>> {
    let member = state
        .db
        .chats()
        .add_member(current.id(), group_id, form.user_id)
        .await?;
    Ok(Json(json!({ "success": true, "member": member })))
}

async fn remove_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((group_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .chats()
        .remove_member(current.id(), group_id, user_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn list_messages(
    state: &AppState,
    current: &CurrentUser,
    kind: ChatKind,
    chat_id: i64,
    page: Option<i64>,
) -> ApiResult<Json<Value>> {
    let chats = state.db.chats();
    let messages = chats
        .messages(
            current.id(),
            kind,
            chat_id,
            page,
            state.config.limits.messages_per_page,
        )
        .await?;
    chats.mark_read(current.id(), kind, chat_id).await?;
    Ok(Json(json!({ "messages": messages })))
}

async fn private_messages(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(chat_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    list_messages(&state, &current, ChatKind::Private, chat_id, query.page).await
}

async fn group_messages(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(chat_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    list_messages(&state, &current, ChatKind::Group, chat_id, query.page).await
}

/// Persist a message and fan out its notifications.
async fn deliver(
    state: &AppState,
    current: &CurrentUser,
    kind: ChatKind,
    chat_id: i64,
    message: NewMessage,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let sent = state
        .db
        .chats()
        .send(current.id(), kind, chat_id, message)
        .instrument(spans::chat(kind.as_str(), chat_id, current.id()))
        .await?;
    metrics::record_message(sent.notified);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": sent.message })),
    ))
}

async fn send_json(
    state: &AppState,
    current: &CurrentUser,
    kind: ChatKind,
    chat_id: i64,
    form: SendForm,
) -> ApiResult<(StatusCode, Json<Value>)> {
    // Checked before the preview so outsiders cannot trigger fetches.
    state
        .db
        .chats()
        .ensure_participant(current.id(), kind, chat_id)
        .await?;
    let message = match form {
        SendForm::Text { content } => NewMessage::Text(content),
        SendForm::Link { url } => {
            let url = url.trim();
            if url.is_empty() {
                return Err(ApiError::Validation("Link URL is required.".to_string()));
            }
            let preview = state.previewer.preview(url).await;
            NewMessage::Link {
                url: preview.url,
                title: preview.title,
                description: preview.description,
                image: preview.image,
            }
        }
    };
    deliver(state, current, kind, chat_id, message).await
}

async fn send_private(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(chat_id): Path<i64>,
    Json(form): Json<SendForm>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    send_json(&state, &current, ChatKind::Private, chat_id, form).await
}

async fn send_group(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(chat_id): Path<i64>,
    Json(form): Json<SendForm>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    send_json(&state, &current, ChatKind::Group, chat_id, form).await
}

/// Multipart: `type` is `image` or `file`, the upload is the `file` part.
async fn send_upload(
    state: &AppState,
    current: &CurrentUser,
    kind: ChatKind,
    chat_id: i64,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut form = FormData::read(multipart).await?;
    let upload = form
        .take_file("file")
        .ok_or_else(|| ApiError::Validation("No file uploaded.".to_string()))?;
    let media_kind = match form.text("type").map(str::trim) {
        Some("image") => MediaKind::ChatImage,
        Some("file") | None => MediaKind::ChatFile,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "Unsupported message type: {other}"
            )));
        }
    };
    state
        .db
        .chats()
        .ensure_participant(current.id(), kind, chat_id)
        .await?;

    let path = store(&state.media, media_kind, &upload).await?;
    let message = match media_kind {
        MediaKind::ChatImage => NewMessage::Image { path: path.clone() },
        _ => NewMessage::File {
            path: path.clone(),
            name: upload.file_name.clone(),
        },
    };
    discard_on_error(
        &state.media,
        deliver(state, current, kind, chat_id, message).await,
        &[Some(path.as_str())],
    )
    .await
}

async fn upload_private(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(chat_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    send_upload(&state, &current, ChatKind::Private, chat_id, multipart).await
}

async fn upload_group(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(chat_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    send_upload(&state, &current, ChatKind::Group, chat_id, multipart).await
}

#[derive(Debug, Deserialize)]
struct EditForm {
    content: String,
}

async fn edit_message(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(message_id): Path<i64>,
    Json(form): Json<EditForm>,
) -> ApiResult<Json<Value>> {
    let message = state
        .db
        .chats()
        .edit_message(current.id(), message_id, &form.content)
        .await?;
    Ok(Json(json!({ "success": true, "message": message })))
}

async fn delete_message(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(message_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .chats()
        .delete_message(current.id(), message_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct ReactForm {
    reaction: String,
}

async fn react(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(message_id): Path<i64>,
    Json(form): Json<ReactForm>,
) -> ApiResult<Json<Value>> {
    let chats = state.db.chats();
    let added = chats.react(current.id(), message_id, &form.reaction).await?;
    let message = chats.message(message_id, current.id()).await?;
    Ok(Json(json!({
        "success": true,
        "added": added,
        "reactions": message.reactions,
    })))
}
