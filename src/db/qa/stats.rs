//! Per-user aggregates for the profile summary and badge rules.

use super::QaRepository;
use crate::db::{DbError, now};
use serde::Serialize;

/// Counters shown on the profile summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityStats {
    pub questions: i64,
    pub answers: i64,
    pub comments: i64,
    pub bookmarks: i64,
    /// Sum of unique views over the user's live questions.
    pub people_reached: i64,
    pub votes_cast: i64,
    pub upvotes_cast: i64,
    pub downvotes_cast: i64,
    pub question_votes: i64,
    pub answer_votes: i64,
    pub votes_last_24h: i64,
}

const VOTES_CAST: &str = r#"
    SELECT direction, created_at, 'question' AS kind FROM question_votes WHERE user_id = ?1
    UNION ALL
    SELECT direction, created_at, 'answer' AS kind FROM answer_votes WHERE user_id = ?1
"#;

impl<'a> QaRepository<'a> {
    pub async fn activity(&self, user_id: i64) -> Result<ActivityStats, DbError> {
        let (questions, answers, comments, bookmarks, people_reached) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM questions WHERE owner_id = ?1 AND is_deleted = 0),
                    (SELECT COUNT(*) FROM answers WHERE owner_id = ?1 AND is_deleted = 0),
                    (SELECT COUNT(*) FROM comments WHERE author_id = ?1),
                    (SELECT COUNT(*) FROM bookmarks WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM question_views v
                     JOIN questions q ON q.id = v.question_id
                     WHERE q.owner_id = ?1 AND q.is_deleted = 0)
                "#,
            )
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        let (votes_cast, upvotes_cast, question_votes, votes_last_24h) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(&format!(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(direction = 1), 0),
                       COALESCE(SUM(kind = 'question'), 0),
                       COALESCE(SUM(created_at > ?2), 0)
                FROM ({VOTES_CAST})
                "#
            ))
            .bind(user_id)
            .bind(now() - 86_400)
            .fetch_one(self.pool)
            .await?;

        Ok(ActivityStats {
            questions,
            answers,
            comments,
            bookmarks,
            people_reached,
            votes_cast,
            upvotes_cast,
            downvotes_cast: votes_cast - upvotes_cast,
            question_votes,
            answer_votes: votes_cast - question_votes,
            votes_last_24h,
        })
    }

    /// Votes cast by a user, optionally only those newer than `since`.
    pub async fn votes_cast(&self, user_id: i64, since: Option<i64>) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM ({VOTES_CAST}) WHERE created_at > ?2"
        ))
        .bind(user_id)
        .bind(since.unwrap_or(i64::MIN))
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    pub async fn downvotes_cast(&self, user_id: i64) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM ({VOTES_CAST}) WHERE direction = -1"
        ))
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    pub async fn comments_count(&self, user_id: i64) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE author_id = ?")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// `(answer_owner, question_owner, score)` for a live answer.
    pub async fn answer_score_info(
        &self,
        answer_id: i64,
    ) -> Result<Option<(i64, i64, i64)>, DbError> {
        let row = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT a.owner_id, q.owner_id,
                   COALESCE((SELECT SUM(direction) FROM answer_votes WHERE answer_id = a.id), 0)
            FROM answers a JOIN questions q ON q.id = a.question_id
            WHERE a.id = ? AND a.is_deleted = 0
            "#,
        )
        .bind(answer_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Answer score accumulated per tag over a user's live answers.
    pub async fn tag_answer_scores(&self, user_id: i64) -> Result<Vec<(String, i64)>, DbError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT t.tag,
                   COALESCE(SUM((SELECT COALESCE(SUM(direction), 0)
                                 FROM answer_votes WHERE answer_id = a.id)), 0) AS score
            FROM answers a
            JOIN questions q ON q.id = a.question_id AND q.is_deleted = 0
            JOIN question_tags t ON t.question_id = q.id
            WHERE a.owner_id = ? AND a.is_deleted = 0
            GROUP BY t.tag
            ORDER BY score DESC, t.tag
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Whether the user has offered a bounty on someone else's question.
    pub async fn has_bounty_on_others(&self, user_id: i64) -> Result<bool, DbError> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM bounties b JOIN questions q ON q.id = b.question_id
                          WHERE b.offered_by = ?1 AND q.owner_id <> ?1)
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(found)
    }

    /// Whether the user has offered a bounty on their own question.
    pub async fn has_bounty_on_own(&self, user_id: i64) -> Result<bool, DbError> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM bounties b JOIN questions q ON q.id = b.question_id
                          WHERE b.offered_by = ?1 AND q.owner_id = ?1)
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(found)
    }
}
