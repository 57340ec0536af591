//! Paged profile tabs: votes cast, per-tag answer activity and the merged
//! timeline of everything a user did.

use super::QaRepository;
use crate::db::{DbError, Page, PageWindow};
use serde::Serialize;

/// Post kind a vote was cast on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Question,
    Answer,
}

/// One vote cast by a user, with the question it belongs to.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CastVote {
    pub kind: PostKind,
    pub question_id: i64,
    pub answer_id: Option<i64>,
    pub title: String,
    /// +1 or -1.
    pub direction: i64,
    pub created_at: i64,
}

/// Entry kind of the all-actions timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Question,
    Answer,
    Comment,
    Bounty,
    Badge,
}

/// One timeline entry. `title` is the question title, or the badge name for
/// badge entries.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActionEntry {
    pub kind: ActionKind,
    pub question_id: Option<i64>,
    pub title: String,
    /// Bounty amount for bounty entries.
    pub amount: Option<i64>,
    pub created_at: i64,
}

/// Answer activity of a user within one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TagActivity {
    pub tag: String,
    pub answers: i64,
    pub score: i64,
}

const CAST_VOTES: &str = r#"
    SELECT 'question' AS kind, q.id AS question_id, NULL AS answer_id, q.title AS title,
           v.direction AS direction, v.created_at AS created_at
    FROM question_votes v JOIN questions q ON q.id = v.question_id
    WHERE v.user_id = ?1 AND q.is_deleted = 0
    UNION ALL
    SELECT 'answer', q.id, a.id, q.title, v.direction, v.created_at
    FROM answer_votes v
    JOIN answers a ON a.id = v.answer_id
    JOIN questions q ON q.id = a.question_id
    WHERE v.user_id = ?1 AND a.is_deleted = 0 AND q.is_deleted = 0
"#;

const ACTIONS: &str = r#"
    SELECT 'question' AS kind, q.id AS question_id, q.title AS title, NULL AS amount,
           q.created_at AS created_at
    FROM questions q
    WHERE q.owner_id = ?1 AND q.is_deleted = 0
    UNION ALL
    SELECT 'answer', q.id, q.title, NULL, a.created_at
    FROM answers a JOIN questions q ON q.id = a.question_id
    WHERE a.owner_id = ?1 AND a.is_deleted = 0 AND q.is_deleted = 0
    UNION ALL
    SELECT 'comment', q.id, q.title, NULL, c.created_at
    FROM comments c
    LEFT JOIN answers a ON a.id = c.answer_id
    JOIN questions q ON q.id = COALESCE(c.question_id, a.question_id)
    WHERE c.author_id = ?1 AND q.is_deleted = 0
    UNION ALL
    SELECT 'bounty', q.id, q.title, b.amount, b.offered_at
    FROM bounties b JOIN questions q ON q.id = b.question_id
    WHERE b.offered_by = ?1
    UNION ALL
    SELECT 'badge', NULL, b.name, NULL, b.awarded_at
    FROM badges b
    WHERE b.user_id = ?1
"#;

impl<'a> QaRepository<'a> {
    /// Votes cast by a user on live posts, newest first.
    pub async fn cast_votes(
        &self,
        user_id: i64,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<Page<CastVote>, DbError> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM ({CAST_VOTES})"))
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;
        let window = PageWindow::new(page, per_page, total);

        let items = sqlx::query_as::<_, CastVote>(&format!(
            "{CAST_VOTES} ORDER BY created_at DESC, question_id DESC, answer_id DESC LIMIT ?2 OFFSET ?3"
        ))
        .bind(user_id)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;
        Ok(window.into_page(items))
    }

    /// Everything a user posted, offered or earned, newest first.
    pub async fn actions(
        &self,
        user_id: i64,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<Page<ActionEntry>, DbError> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM ({ACTIONS})"))
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;
        let window = PageWindow::new(page, per_page, total);

        let items = sqlx::query_as::<_, ActionEntry>(&format!(
            "{ACTIONS} ORDER BY created_at DESC, kind, question_id DESC LIMIT ?2 OFFSET ?3"
        ))
        .bind(user_id)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;
        Ok(window.into_page(items))
    }

    /// Tags the user answered in, by answer score then answer count.
    pub async fn answered_tags(&self, user_id: i64) -> Result<Vec<TagActivity>, DbError> {
        let rows = sqlx::query_as::<_, TagActivity>(
            r#"
            SELECT t.tag AS tag,
                   COUNT(*) AS answers,
                   COALESCE(SUM((SELECT COALESCE(SUM(direction), 0)
                                 FROM answer_votes WHERE answer_id = a.id)), 0) AS score
            FROM answers a
            JOIN questions q ON q.id = a.question_id AND q.is_deleted = 0
            JOIN question_tags t ON t.question_id = q.id
            WHERE a.owner_id = ? AND a.is_deleted = 0
            GROUP BY t.tag
            ORDER BY score DESC, answers DESC, t.tag
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
