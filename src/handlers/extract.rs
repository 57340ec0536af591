//! Session extractor.

use crate::db::{Actor, User};
use crate::error::ApiError;
use crate::http::AppState;
use crate::security::session::token_from_cookie_header;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;

/// The logged-in user behind the request's session cookie.
///
/// Rejects with 401 when the cookie is missing, the session expired or the
/// account was deactivated.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    /// Raw session token, kept for logout.
    pub token: String,
}

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.user.id,
            is_staff: self.user.is_staff,
            is_superuser: self.user.is_superuser,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(token_from_cookie_header)
            .map(str::to_string)
            .ok_or(ApiError::Unauthenticated)?;

        let user_id = state
            .db
            .sessions()
            .resolve(&token)
            .await?
            .ok_or(ApiError::Unauthenticated)?;
        let user = state
            .db
            .accounts()
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ApiError::Unauthenticated)?;

        Ok(Self { user, token })
    }
}
