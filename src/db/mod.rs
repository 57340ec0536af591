//! Database module for persistent storage.
//!
//! Provides async SQLite database access using SQLx for:
//! - Accounts, profiles and login sessions
//! - Questions, answers, votes, bounties and the reputation ledger
//! - Badge awards and notifications
//! - Private/group chats and their messages
//! - Communities, memberships and join requests
//! - Campus updates

mod accounts;
mod badges;
mod campus_updates;
mod chats;
mod communities;
mod notifications;
mod qa;
mod reputation;
mod sessions;

pub use accounts::{AccountRepository, NewAccount, Profile, ProfileUpdate, User, UserType};
pub use badges::{BadgeAward, BadgePosition, BadgeRepository, BadgeTier};
pub use campus_updates::{
    CampusUpdate, CampusUpdateFilter, CampusUpdateInput, CampusUpdateRepository, Category,
    Priority,
};
pub use chats::{ChatKind, ChatRepository, GroupChat, NewMessage};
pub use communities::{
    Community, CommunityDetail, CommunityInput, CommunityListing, CommunityRepository,
    JoinOutcome, MemberRole, MembersPage,
};
pub use notifications::{NotificationRepository, UnreadCounts};
pub use qa::{
    ActivityStats, Answer, CommentTarget, HotWindow, QaRepository, Question, QuestionDetail,
    VoteDirection, VoteOutcome, VoteTarget,
};
pub use reputation::{ReputationEvent, ReputationRepository};
pub use sessions::SessionRepository;

#[cfg(test)]
pub(crate) use qa::test_support;

use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("account already exists: {0}")]
    AccountExists(String),
    #[error("invalid password")]
    InvalidPassword,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    InsufficientAccess(String),
    #[error("{0}")]
    Invalid(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// Shorthand for a missing row of the given kind.
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        DbError::NotFound(what.into())
    }

    pub(crate) fn denied(reason: impl Into<String>) -> Self {
        DbError::InsufficientAccess(reason.into())
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        DbError::Invalid(reason.into())
    }
}

/// The authenticated user performing a mutation, for ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Actor {
    /// Staff and superusers may moderate other users' posts.
    pub fn is_moderator(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    /// Owner of the row, or a moderator.
    pub fn can_manage(&self, owner_id: i64) -> bool {
        self.id == owner_id || self.is_moderator()
    }
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // `file::memory:` is shared process-wide and collides across parallel
            // tests, so every call gets its own named shared-cache database.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:stdforum-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;

        // WAL lets profile and listing reads proceed while a vote or message commits.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(DbError::Sqlx(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Database integrity check failed: {}", integrity_result),
            ))));
        }

        info!("Database integrity check passed");

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run embedded migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get account repository.
    pub fn accounts(&self) -> AccountRepository<'_> {
        AccountRepository::new(&self.pool)
    }

    /// Get login session repository.
    pub fn sessions(&self) -> SessionRepository<'_> {
        SessionRepository::new(&self.pool)
    }

    /// Get question/answer repository.
    pub fn qa(&self) -> QaRepository<'_> {
        QaRepository::new(&self.pool)
    }

    /// Get reputation ledger repository.
    pub fn reputation(&self) -> ReputationRepository<'_> {
        ReputationRepository::new(&self.pool)
    }

    /// Get badge award repository.
    pub fn badges(&self) -> BadgeRepository<'_> {
        BadgeRepository::new(&self.pool)
    }

    /// Get chat repository.
    pub fn chats(&self) -> ChatRepository<'_> {
        ChatRepository::new(&self.pool)
    }

    /// Get community repository.
    pub fn communities(&self) -> CommunityRepository<'_> {
        CommunityRepository::new(&self.pool)
    }

    /// Get notification repository.
    pub fn notifications(&self) -> NotificationRepository<'_> {
        NotificationRepository::new(&self.pool)
    }

    /// Get campus update repository.
    pub fn campus_updates(&self) -> CampusUpdateRepository<'_> {
        CampusUpdateRepository::new(&self.pool)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}

/// True when the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Current unix timestamp in seconds.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// One page of a paginated listing.
///
/// Out-of-range page numbers resolve to the nearest valid page, so callers
/// never see an empty page for a non-empty listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub num_pages: i64,
    pub total: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Resolved page position for a listing of `total` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl PageWindow {
    pub fn new(requested: Option<i64>, per_page: i64, total: i64) -> Self {
        let per_page = per_page.max(1);
        let num_pages = Self::pages_for(total, per_page);
        let page = requested.unwrap_or(1).clamp(1, num_pages);
        Self {
            page,
            per_page,
            total,
        }
    }

    fn pages_for(total: i64, per_page: i64) -> i64 {
        ((total + per_page - 1) / per_page).max(1)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn num_pages(&self) -> i64 {
        Self::pages_for(self.total, self.per_page)
    }

    pub fn into_page<T>(self, items: Vec<T>) -> Page<T> {
        let num_pages = self.num_pages();
        Page {
            items,
            page: self.page,
            num_pages,
            total: self.total,
            has_next: self.page < num_pages,
            has_previous: self.page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_databases_are_isolated() {
        let a = Database::new(":memory:").await.unwrap();
        let b = Database::new(":memory:").await.unwrap();

        a.accounts()
            .create(NewAccount::student("alice", "alice@khec.edu.np", "pw-123456"))
            .await
            .unwrap();

        assert!(a.accounts().find_by_username("alice").await.unwrap().is_some());
        assert!(b.accounts().find_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("forum.db");
        let db = Database::new(path.to_str().unwrap()).await.unwrap();
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(fk, 1);
        assert!(path.exists());
    }

    #[test]
    fn page_window_clamps_out_of_range_pages() {
        let w = PageWindow::new(Some(9), 10, 25);
        assert_eq!(w.page, 3);
        assert_eq!(w.offset(), 20);

        let w = PageWindow::new(Some(0), 10, 25);
        assert_eq!(w.page, 1);

        let empty = PageWindow::new(Some(4), 12, 0).into_page(Vec::<i64>::new());
        assert_eq!(empty.page, 1);
        assert_eq!(empty.num_pages, 1);
        assert!(!empty.has_next);
        assert!(!empty.has_previous);
    }

    #[test]
    fn page_flags_follow_position() {
        let p = PageWindow::new(Some(2), 10, 25).into_page(vec![1, 2, 3]);
        assert!(p.has_next);
        assert!(p.has_previous);
        assert_eq!(p.num_pages, 3);
    }
}
