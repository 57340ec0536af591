//! Question/answer repository.
//!
//! - [`questions`]: asking, editing, soft-deleting, viewing and listings
//! - [`answers`]: answers, comments and accepting an answer
//! - [`votes`]: vote toggles, bookmarks and bounties
//! - [`stats`]: per-user aggregates feeding badges and the profile summary
//! - [`activity`]: paged profile tabs (votes cast, tags, all actions)

mod activity;
mod answers;
mod questions;
mod stats;
mod votes;

pub use stats::ActivityStats;
pub use votes::{VoteDirection, VoteOutcome, VoteTarget};

use super::DbError;
use serde::Serialize;
use sqlx::SqlitePool;

/// Maximum number of tags on a question.
pub const MAX_TAGS: usize = 5;
/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 35;

/// A question with its derived counters.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Question {
    pub id: i64,
    pub owner_id: i64,
    pub owner_username: String,
    pub title: String,
    pub body: String,
    #[sqlx(skip)]
    pub tags: Vec<String>,
    pub created_at: i64,
    pub edited_at: Option<i64>,
    pub is_deleted: bool,
    pub is_bountied: bool,
    pub bounty_amount: i64,
    pub accepted_answer_id: Option<i64>,
    pub view_count: i64,
    pub score: i64,
    pub answer_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub owner_id: i64,
    pub owner_username: String,
    pub body: String,
    pub created_at: i64,
    pub edited_at: Option<i64>,
    pub is_deleted: bool,
    pub score: i64,
    pub is_accepted: bool,
    pub viewer_vote: Option<i64>,
    #[sqlx(skip)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub question_id: Option<i64>,
    pub answer_id: Option<i64>,
    pub author_id: i64,
    pub author_username: String,
    pub body: String,
    pub created_at: i64,
}

/// What a comment is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentTarget {
    Question(i64),
    Answer(i64),
}

/// Everything the question page shows.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionDetail {
    pub question: Question,
    pub comments: Vec<Comment>,
    pub answers: Vec<Answer>,
    pub viewer_vote: Option<i64>,
    pub bookmarked: bool,
}

/// Window for the "hot questions" listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotWindow {
    Day,
    Week,
    Month,
}

impl HotWindow {
    pub fn days(self) -> i64 {
        match self {
            Self::Day => 3,
            Self::Week => 7,
            Self::Month => 28,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

const QUESTION_SELECT: &str = r#"
    SELECT q.id, q.owner_id, u.username AS owner_username, q.title, q.body, q.created_at,
           q.edited_at, q.is_deleted, q.is_bountied,
           COALESCE((SELECT SUM(b.amount) FROM bounties b
                     WHERE b.question_id = q.id AND b.awarded_at IS NULL), 0) AS bounty_amount,
           q.accepted_answer_id,
           (SELECT COUNT(*) FROM question_views v WHERE v.question_id = q.id) AS view_count,
           COALESCE((SELECT SUM(qv.direction) FROM question_votes qv
                     WHERE qv.question_id = q.id), 0) AS score,
           (SELECT COUNT(*) FROM answers a
            WHERE a.question_id = q.id AND a.is_deleted = 0) AS answer_count
    FROM questions q JOIN users u ON u.id = q.owner_id
"#;

/// Normalize user supplied tags: trimmed, lowercase, unique, capped.
pub fn normalize_tags<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>, DbError> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() || tags.contains(&tag) {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LEN || tag.chars().any(char::is_whitespace) {
            return Err(DbError::invalid(format!("Invalid tag: {tag}")));
        }
        tags.push(tag);
    }
    if tags.len() > MAX_TAGS {
        return Err(DbError::invalid(format!(
            "A question can have at most {MAX_TAGS} tags."
        )));
    }
    Ok(tags)
}

/// Repository for question/answer operations.
pub struct QaRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> QaRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Fill in `tags` for a batch of questions.
    async fn attach_tags(&self, questions: &mut [Question]) -> Result<(), DbError> {
        if questions.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        let ids_json = serde_json::to_string(&ids).map_err(|e| DbError::Internal(e.to_string()))?;

        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT question_id, tag FROM question_tags
            WHERE question_id IN (SELECT value FROM json_each(?))
            ORDER BY tag
            "#,
        )
        .bind(ids_json)
        .fetch_all(self.pool)
        .await?;

        for (question_id, tag) in rows {
            if let Some(q) = questions.iter_mut().find(|q| q.id == question_id) {
                q.tags.push(tag);
            }
        }
        Ok(())
    }
}
