//! Reputation ledger.
//!
//! Every reputation change is a ledger row plus an update of the cached
//! `profiles.reputation` counter, written on the caller's connection so the
//! pair commits or rolls back with the action that caused it.

use super::{DbError, Page, PageWindow};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

/// Why a reputation change happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReputationReason {
    QuestionUpvoted,
    QuestionDownvoted,
    AnswerUpvoted,
    AnswerDownvoted,
    DownvoteCast,
    AnswerAccepted,
    AcceptedAnAnswer,
    BountyOffered,
    BountyAwarded,
}

impl ReputationReason {
    /// Points granted (or taken) for the event, before any reversal.
    pub fn points(self) -> i64 {
        match self {
            Self::QuestionUpvoted => 10,
            Self::QuestionDownvoted => -2,
            Self::AnswerUpvoted => 10,
            Self::AnswerDownvoted => -2,
            Self::DownvoteCast => -1,
            Self::AnswerAccepted => 15,
            Self::AcceptedAnAnswer => 2,
            // Bounty amounts are variable and passed explicitly.
            Self::BountyOffered | Self::BountyAwarded => 0,
        }
    }
}

/// One ledger row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReputationEvent {
    pub id: i64,
    pub user_id: i64,
    pub delta: i64,
    pub reason: ReputationReason,
    pub question_id: Option<i64>,
    pub answer_id: Option<i64>,
    pub created_at: i64,
}

/// Post a ledger row and move the profile counter by the same delta.
pub(crate) async fn post(
    conn: &mut SqliteConnection,
    user_id: i64,
    delta: i64,
    reason: ReputationReason,
    question_id: Option<i64>,
    answer_id: Option<i64>,
) -> Result<(), DbError> {
    if delta == 0 {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO reputation_events (user_id, delta, reason, question_id, answer_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(delta)
    .bind(reason)
    .bind(question_id)
    .bind(answer_id)
    .bind(super::now())
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE profiles SET reputation = reputation + ? WHERE user_id = ?")
        .bind(delta)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Read side of the ledger.
pub struct ReputationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReputationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Sum of every ledger row for a user.
    pub async fn total(&self, user_id: i64) -> Result<i64, DbError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0) FROM reputation_events WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(total)
    }

    /// Most recent ledger rows, newest first.
    pub async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<ReputationEvent>, DbError> {
        let rows = sqlx::query_as::<_, ReputationEvent>(
            r#"
            SELECT id, user_id, delta, reason, question_id, answer_id, created_at
            FROM reputation_events
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// The whole ledger, paged, newest first.
    pub async fn page(
        &self,
        user_id: i64,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<Page<ReputationEvent>, DbError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reputation_events WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;
        let window = PageWindow::new(page, per_page, total);

        let rows = sqlx::query_as::<_, ReputationEvent>(
            r#"
            SELECT id, user_id, delta, reason, question_id, answer_id, created_at
            FROM reputation_events
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;
        Ok(window.into_page(rows))
    }
}
