//! HTTP route handlers.
//!
//! One module per forum area, each exposing `routes()`. Every route except
//! login requires a session, resolved by the [`CurrentUser`] extractor.
//!
//! Mutations answer `{"success": true, ...}`; page views answer with the
//! page's view-model directly.

mod accounts;
mod campus;
mod chat;
mod community;
mod extract;
mod notifications;
mod profile;
mod qa;
mod tags;
mod upload;

pub use extract::CurrentUser;

use crate::db::DbError;
use crate::http::AppState;
use axum::Router;
use serde::Deserialize;
use tracing::warn;

/// All API routes, without state.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(accounts::routes())
        .merge(profile::routes())
        .merge(qa::routes())
        .merge(chat::routes())
        .merge(community::routes())
        .merge(notifications::routes())
        .merge(campus::routes())
        .merge(tags::routes())
}

/// `?page=N` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

/// Badge rules run after the write they react to has committed; a failing
/// rule is logged and yields no awards.
pub(crate) fn awarded_or_log(result: Result<Vec<String>, DbError>, user_id: i64) -> Vec<String> {
    result.unwrap_or_else(|e| {
        warn!(user_id, error = %e, "Badge check failed");
        Vec::new()
    })
}
