//! Login, logout, staff signup and forced password changes.

use super::CurrentUser;
use crate::db::{DbError, NewAccount, UserType};
use crate::error::{ApiError, ApiResult};
use crate::http::AppState;
use crate::metrics;
use crate::security::password::check_strength;
use crate::security::session::{expired_cookie, session_cookie};
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/password", post(force_password_change))
        .route("/api/me", get(me))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(form): Json<LoginForm>) -> ApiResult<Response> {
    let auth = &state.config.auth;
    let email = form.email.trim().to_lowercase();

    if !auth.email_allowed(&email) {
        metrics::record_login_failure("domain");
        return Err(ApiError::Validation(format!(
            "Please use your college email ({}).",
            auth.allowed_domains_display()
        )));
    }
    if !state.login_limiter.check(&email) {
        metrics::record_login_failure("rate_limited");
        return Err(ApiError::RateLimited);
    }

    let user = match state.db.accounts().authenticate(&email, &form.password).await {
        Ok(user) => user,
        Err(DbError::AccountNotFound(_) | DbError::InvalidPassword) => {
            metrics::record_login_failure("bad_credentials");
            warn!(email = %email, "Failed login");
            return Err(ApiError::bad_request("Invalid email or password."));
        }
        Err(e) => return Err(e.into()),
    };
    state.login_limiter.reset(&email);

    let ttl = auth.session_ttl_secs();
    let token = state.db.sessions().create(user.id, ttl).await?;
    let profile = state.db.accounts().profile(user.id).await?;
    info!(user_id = user.id, username = %user.username, "User logged in");

    let body = Json(json!({
        "success": true,
        "user": user,
        "password_change_required": profile.password_change_required,
    }));
    Ok(([(SET_COOKIE, session_cookie(&token, ttl))], body).into_response())
}

async fn logout(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Response> {
    state.db.sessions().delete(&current.token).await?;
    info!(user_id = current.id(), "User logged out");
    let body = Json(json!({ "success": true }));
    Ok(([(SET_COOKIE, expired_cookie())], body).into_response())
}

#[derive(Debug, Deserialize)]
struct SignupForm {
    username: String,
    email: String,
    password: String,
}

/// Staff create accounts; the new user must change the password on first login.
async fn signup(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<SignupForm>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if !current.user.is_staff {
        return Err(ApiError::forbidden("Only staff members can create accounts."));
    }

    let auth = &state.config.auth;
    let username = form.username.trim();
    let email = form.email.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::Validation("Username is required.".to_string()));
    }
    if !auth.email_allowed(&email) {
        return Err(ApiError::Validation(format!(
            "Email must end with one of: {}",
            auth.allowed_domains_display()
        )));
    }
    check_strength(&form.password).map_err(ApiError::Validation)?;

    let user_type = if email.ends_with(&format!("@{}", auth.teacher_domain)) {
        UserType::Teacher
    } else {
        UserType::Student
    };
    let user = state
        .db
        .accounts()
        .create(NewAccount {
            user_type,
            password_change_required: true,
            ..NewAccount::student(username, &email, &form.password)
        })
        .await?;

    info!(user_id = user.id, created_by = current.id(), "Account created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": user })),
    ))
}

#[derive(Debug, Deserialize)]
struct PasswordForm {
    new_password: String,
    confirm_password: String,
}

async fn force_password_change(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<PasswordForm>,
) -> ApiResult<Json<Value>> {
    let accounts = state.db.accounts();
    if !accounts.profile(current.id()).await?.password_change_required {
        return Err(ApiError::bad_request("Password change is not required."));
    }
    if form.new_password != form.confirm_password {
        return Err(ApiError::Validation("Passwords do not match.".to_string()));
    }
    check_strength(&form.new_password).map_err(ApiError::Validation)?;

    accounts.change_password(current.id(), &form.new_password).await?;
    info!(user_id = current.id(), "Password changed");
    Ok(Json(json!({ "success": true })))
}

async fn me(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Json<Value>> {
    let profile = state.db.accounts().profile(current.id()).await?;
    let unread = state.db.notifications().unread_counts(current.id()).await?;
    Ok(Json(json!({
        "user": current.user,
        "profile": profile,
        "unread": unread,
    })))
}
