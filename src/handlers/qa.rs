//! Questions, answers, comments, votes, bounties and bookmarks.

use super::{CurrentUser, PageQuery, awarded_or_log};
use crate::db::{
    Answer, CommentTarget, HotWindow, Question, QuestionDetail, VoteDirection, VoteTarget,
};
use crate::error::{ApiError, ApiResult};
use crate::http::AppState;
use crate::services::BadgeService;
use crate::services::tags::tag_metadata;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/questions", get(home).post(ask))
        .route("/api/questions/bountied", get(bountied))
        .route("/api/questions/hot/:window", get(hot))
        .route(
            "/api/questions/:id",
            get(view).put(edit_question).delete(delete_question),
        )
        .route("/api/questions/:id/answers", post(answer))
        .route("/api/questions/:id/comments", post(comment_on_question))
        .route("/api/questions/:id/vote", post(vote_question))
        .route("/api/questions/:id/accept/:answer_id", post(accept))
        .route("/api/questions/:id/bounty", post(offer_bounty))
        .route("/api/questions/:id/bounty/award", post(award_bounty))
        .route("/api/questions/:id/bookmark", post(bookmark))
        .route("/api/answers/:id", put(edit_answer).delete(delete_answer))
        .route("/api/answers/:id/comments", post(comment_on_answer))
        .route("/api/answers/:id/vote", post(vote_answer))
        .route("/api/tags/:tag/questions", get(by_tag))
}

#[derive(Debug, Deserialize)]
struct QuestionForm {
    title: String,
    body: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BodyForm {
    body: String,
}

#[derive(Debug, Deserialize)]
struct VoteForm {
    direction: VoteDirection,
}

#[derive(Debug, Deserialize)]
struct BountyForm {
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct AwardForm {
    answer_id: i64,
}

/// The home feed with this week's hot topics and the bounty tab counter.
async fn home(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let qa = state.db.qa();
    let limits = &state.config.limits;
    let questions = qa.home(query.page, limits.questions_per_page).await?;
    let hot_topics = qa.hot_topics(limits.hot_topics).await?;
    let bountied_count = qa.bountied_count().await?;
    Ok(Json(json!({
        "questions": questions,
        "hot_topics": hot_topics,
        "bountied_count": bountied_count,
    })))
}

async fn bountied(State(state): State<AppState>, _current: CurrentUser) -> ApiResult<Json<Value>> {
    let questions = state
        .db
        .qa()
        .bountied(state.config.limits.home_questions)
        .await?;
    Ok(Json(json!({ "questions": questions })))
}

async fn hot(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(window): Path<String>,
) -> ApiResult<Json<Value>> {
    let window = HotWindow::parse(&window)
        .ok_or_else(|| ApiError::bad_request("Window must be day, week or month."))?;
    let questions = state
        .db
        .qa()
        .hot(window, state.config.limits.home_questions)
        .await?;
    Ok(Json(json!({ "questions": questions })))
}

async fn by_tag(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(tag): Path<String>,
) -> ApiResult<Json<Value>> {
    let questions = state
        .db
        .qa()
        .by_tag(&tag, state.config.limits.home_questions)
        .await?;
    Ok(Json(json!({
        "tag": tag,
        "meta": tag_metadata(&tag),
        "questions": questions,
    })))
}

async fn ask(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<QuestionForm>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let question = state
        .db
        .qa()
        .ask(current.id(), &form.title, &form.body, &form.tags)
        .await?;
    info!(user_id = current.id(), question_id = question.id, "Question asked");
    Ok((StatusCode::CREATED, Json(question)))
}

/// Question page; the first visit of each user counts as a view.
async fn view(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<QuestionDetail>> {
    let qa = state.db.qa();
    qa.question(id).await?;
    qa.record_view(id, current.id()).await?;
    Ok(Json(qa.detail(id, current.id()).await?))
}

async fn edit_question(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<QuestionForm>,
) -> ApiResult<Json<Question>> {
    let question = state
        .db
        .qa()
        .edit_question(&current.actor(), id, &form.title, &form.body, &form.tags)
        .await?;
    Ok(Json(question))
}

async fn delete_question(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.db.qa().delete_question(&current.actor(), id).await?;
    info!(user_id = current.id(), question_id = id, "Question deleted");
    Ok(Json(json!({ "success": true })))
}

async fn answer(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(question_id): Path<i64>,
    Json(form): Json<BodyForm>,
) -> ApiResult<(StatusCode, Json<Answer>)> {
    let answer = state
        .db
        .qa()
        .answer(current.id(), question_id, &form.body)
        .await?;
    info!(user_id = current.id(), question_id, answer_id = answer.id, "Answer posted");
    Ok((StatusCode::CREATED, Json(answer)))
}

async fn edit_answer(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<BodyForm>,
) -> ApiResult<Json<Answer>> {
    let answer = state
        .db
        .qa()
        .edit_answer(&current.actor(), id, &form.body)
        .await?;
    Ok(Json(answer))
}

async fn delete_answer(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.db.qa().delete_answer(&current.actor(), id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn comment(
    state: &AppState,
    current: &CurrentUser,
    target: CommentTarget,
    body: &str,
) -> ApiResult<Json<Value>> {
    let comment = state.db.qa().comment(current.id(), target, body).await?;
    let badges = awarded_or_log(
        BadgeService::new(&state.db).after_comment(current.id()).await,
        current.id(),
    );
    Ok(Json(json!({
        "success": true,
        "comment": comment,
        "badges_awarded": badges,
    })))
}

async fn comment_on_question(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<BodyForm>,
) -> ApiResult<Json<Value>> {
    comment(&state, &current, CommentTarget::Question(id), &form.body).await
}

async fn comment_on_answer(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<BodyForm>,
) -> ApiResult<Json<Value>> {
    comment(&state, &current, CommentTarget::Answer(id), &form.body).await
}

async fn vote(
    state: &AppState,
    current: &CurrentUser,
    target: VoteTarget,
    direction: VoteDirection,
) -> ApiResult<Json<Value>> {
    let outcome = state.db.qa().vote(current.id(), target, direction).await?;
    let badges = awarded_or_log(
        BadgeService::new(&state.db)
            .after_vote(current.id(), target, &outcome)
            .await,
        current.id(),
    );
    Ok(Json(json!({
        "success": true,
        "score": outcome.score,
        "user_vote": outcome.user_vote,
        "badges_awarded": badges,
    })))
}

async fn vote_question(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<VoteForm>,
) -> ApiResult<Json<Value>> {
    vote(&state, &current, VoteTarget::Question(id), form.direction).await
}

async fn vote_answer(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<VoteForm>,
) -> ApiResult<Json<Value>> {
    vote(&state, &current, VoteTarget::Answer(id), form.direction).await
}

async fn accept(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((question_id, answer_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .qa()
        .accept_answer(&current.actor(), question_id, answer_id)
        .await?;
    info!(question_id, answer_id, "Answer accepted");
    Ok(Json(json!({ "success": true, "accepted_answer_id": answer_id })))
}

async fn offer_bounty(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(question_id): Path<i64>,
    Json(form): Json<BountyForm>,
) -> ApiResult<Json<Value>> {
    let bounty = state
        .db
        .qa()
        .offer_bounty(current.id(), question_id, form.amount)
        .await?;
    let badges = awarded_or_log(
        BadgeService::new(&state.db).after_bounty(current.id()).await,
        current.id(),
    );
    info!(user_id = current.id(), question_id, amount = form.amount, "Bounty offered");
    Ok(Json(json!({
        "success": true,
        "bounty": bounty,
        "badges_awarded": badges,
    })))
}

async fn award_bounty(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(question_id): Path<i64>,
    Json(form): Json<AwardForm>,
) -> ApiResult<Json<Value>> {
    let amount = state
        .db
        .qa()
        .award_bounty(&current.actor(), question_id, form.answer_id)
        .await?;
    info!(question_id, answer_id = form.answer_id, amount, "Bounty awarded");
    Ok(Json(json!({ "success": true, "amount": amount })))
}

async fn bookmark(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(question_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let bookmarked = state
        .db
        .qa()
        .toggle_bookmark(current.id(), question_id)
        .await?;
    Ok(Json(json!({ "success": true, "bookmarked": bookmarked })))
}
