//! Asking, editing, viewing and listing questions.

use super::{
    Comment, HotWindow, QUESTION_SELECT, QaRepository, Question, QuestionDetail, normalize_tags,
};
use crate::db::{Actor, DbError, Page, PageWindow, now};
use sqlx::SqliteConnection;

const MIN_TITLE_LEN: usize = 5;
const MIN_BODY_LEN: usize = 10;

fn validate_post(title: &str, body: &str) -> Result<(), DbError> {
    if title.trim().chars().count() < MIN_TITLE_LEN {
        return Err(DbError::invalid(format!(
            "Title must be at least {MIN_TITLE_LEN} characters long."
        )));
    }
    if body.trim().chars().count() < MIN_BODY_LEN {
        return Err(DbError::invalid(format!(
            "Body must be at least {MIN_BODY_LEN} characters long."
        )));
    }
    Ok(())
}

async fn replace_tags(
    conn: &mut SqliteConnection,
    question_id: i64,
    tags: &[String],
) -> Result<(), DbError> {
    sqlx::query("DELETE FROM question_tags WHERE question_id = ?")
        .bind(question_id)
        .execute(&mut *conn)
        .await?;
    for tag in tags {
        sqlx::query("INSERT INTO question_tags (question_id, tag) VALUES (?, ?)")
            .bind(question_id)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

impl<'a> QaRepository<'a> {
    /// Post a new question.
    pub async fn ask<S: AsRef<str>>(
        &self,
        owner_id: i64,
        title: &str,
        body: &str,
        tags: &[S],
    ) -> Result<Question, DbError> {
        validate_post(title, body)?;
        let tags = normalize_tags(tags)?;

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            "INSERT INTO questions (owner_id, title, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(title.trim())
        .bind(body.trim())
        .bind(now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        replace_tags(&mut tx, id, &tags).await?;
        tx.commit().await?;

        self.question(id).await
    }

    /// Load a live question.
    pub async fn question(&self, id: i64) -> Result<Question, DbError> {
        let question = self.question_any(id).await?;
        if question.is_deleted {
            return Err(DbError::not_found("Question"));
        }
        Ok(question)
    }

    /// Load a question including soft-deleted ones.
    pub(crate) async fn question_any(&self, id: i64) -> Result<Question, DbError> {
        let mut question = sqlx::query_as::<_, Question>(&format!("{QUESTION_SELECT} WHERE q.id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Question"))?;
        self.attach_tags(std::slice::from_mut(&mut question)).await?;
        Ok(question)
    }

    /// Edit title, body and tags (owner or staff).
    pub async fn edit_question<S: AsRef<str>>(
        &self,
        actor: &Actor,
        id: i64,
        title: &str,
        body: &str,
        tags: &[S],
    ) -> Result<Question, DbError> {
        let existing = self.question(id).await?;
        if !actor.can_manage(existing.owner_id) {
            return Err(DbError::denied("You can only edit your own questions."));
        }
        validate_post(title, body)?;
        let tags = normalize_tags(tags)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE questions SET title = ?, body = ?, edited_at = ? WHERE id = ?")
            .bind(title.trim())
            .bind(body.trim())
            .bind(now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        replace_tags(&mut tx, id, &tags).await?;
        tx.commit().await?;

        self.question(id).await
    }

    /// Soft-delete a question (owner or staff). It disappears from every listing.
    pub async fn delete_question(&self, actor: &Actor, id: i64) -> Result<(), DbError> {
        let existing = self.question(id).await?;
        if !actor.can_manage(existing.owner_id) {
            return Err(DbError::denied("You can only delete your own questions."));
        }
        sqlx::query("UPDATE questions SET is_deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Record a unique viewer. Returns `true` the first time a user views it.
    pub async fn record_view(&self, question_id: i64, viewer_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO question_views (question_id, user_id, viewed_at) VALUES (?, ?, ?)",
        )
        .bind(question_id)
        .bind(viewer_id)
        .bind(now())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// The question page: question, its comments, answers with their comments.
    pub async fn detail(&self, id: i64, viewer_id: i64) -> Result<QuestionDetail, DbError> {
        let question = self.question(id).await?;
        let comments = self.comments_for_question(id).await?;
        let answers = self.answers_for(id, viewer_id).await?;

        let viewer_vote: Option<i64> = sqlx::query_scalar(
            "SELECT direction FROM question_votes WHERE question_id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(viewer_id)
        .fetch_optional(self.pool)
        .await?;

        let bookmarked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM bookmarks WHERE question_id = ? AND user_id = ?)",
        )
        .bind(id)
        .bind(viewer_id)
        .fetch_one(self.pool)
        .await?;

        Ok(QuestionDetail {
            question,
            comments,
            answers,
            viewer_vote,
            bookmarked,
        })
    }

    pub(super) async fn comments_for_question(&self, id: i64) -> Result<Vec<Comment>, DbError> {
        let rows = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.question_id, c.answer_id, c.author_id, u.username AS author_username,
                   c.body, c.created_at
            FROM comments c JOIN users u ON u.id = c.author_id
            WHERE c.question_id = ?
            ORDER BY c.created_at, c.id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    async fn listing(&self, sql: &str, binds: &[i64]) -> Result<Vec<Question>, DbError> {
        let mut query = sqlx::query_as::<_, Question>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let mut questions = query.fetch_all(self.pool).await?;
        self.attach_tags(&mut questions).await?;
        Ok(questions)
    }

    /// The home feed: every live question, bountied ones included, newest first.
    pub async fn home(&self, page: Option<i64>, per_page: i64) -> Result<Page<Question>, DbError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE is_deleted = 0")
            .fetch_one(self.pool)
            .await?;
        let window = PageWindow::new(page, per_page, total);
        let items = self
            .listing(
                &format!(
                    "{QUESTION_SELECT} WHERE q.is_deleted = 0 \
                     ORDER BY q.created_at DESC, q.id DESC LIMIT ? OFFSET ?"
                ),
                &[window.per_page, window.offset()],
            )
            .await?;
        Ok(window.into_page(items))
    }

    /// Questions asked during the last week with the best net score.
    pub async fn hot_topics(&self, limit: i64) -> Result<Vec<Question>, DbError> {
        let since = now() - HotWindow::Week.days() * 86_400;
        self.listing(
            &format!(
                r#"
                SELECT * FROM ({QUESTION_SELECT} WHERE q.is_deleted = 0 AND q.created_at >= ?)
                ORDER BY score DESC, created_at DESC, id DESC
                LIMIT ?
                "#
            ),
            &[since, limit],
        )
        .await
    }

    /// Live questions with an open bounty, newest first.
    pub async fn bountied(&self, limit: i64) -> Result<Vec<Question>, DbError> {
        self.listing(
            &format!(
                "{QUESTION_SELECT} WHERE q.is_deleted = 0 AND q.is_bountied = 1 \
                 ORDER BY q.created_at DESC, q.id DESC LIMIT ?"
            ),
            &[limit],
        )
        .await
    }

    /// Number of live bountied questions (shown as a tab counter).
    pub async fn bountied_count(&self) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM questions WHERE is_deleted = 0 AND is_bountied = 1",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Questions with the most upvotes plus answers inside the window.
    pub async fn hot(&self, window: HotWindow, limit: i64) -> Result<Vec<Question>, DbError> {
        let since = now() - window.days() * 86_400;
        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT base.*,
                       (SELECT COUNT(*) FROM question_votes v
                        WHERE v.question_id = base.id AND v.direction = 1 AND v.created_at > ?)
                     + (SELECT COUNT(*) FROM answers a
                        WHERE a.question_id = base.id AND a.is_deleted = 0 AND a.created_at > ?)
                       AS activity
                FROM ({QUESTION_SELECT} WHERE q.is_deleted = 0) base
            )
            WHERE activity > 0
            ORDER BY activity DESC, created_at DESC, id DESC
            LIMIT ?
            "#
        );
        self.listing(&sql, &[since, since, limit]).await
    }

    /// Live questions carrying a tag, newest first.
    pub async fn by_tag(&self, tag: &str, limit: i64) -> Result<Vec<Question>, DbError> {
        let mut questions = sqlx::query_as::<_, Question>(&format!(
            r#"
            {QUESTION_SELECT}
            WHERE q.is_deleted = 0
              AND EXISTS (SELECT 1 FROM question_tags t WHERE t.question_id = q.id AND t.tag = ?)
            ORDER BY q.created_at DESC, q.id DESC
            LIMIT ?
            "#
        ))
        .bind(tag.trim().to_lowercase())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        self.attach_tags(&mut questions).await?;
        Ok(questions)
    }

    /// Live questions of one user, newest first.
    pub async fn by_owner(&self, owner_id: i64, limit: i64) -> Result<Vec<Question>, DbError> {
        self.listing(
            &format!(
                "{QUESTION_SELECT} WHERE q.is_deleted = 0 AND q.owner_id = ? \
                 ORDER BY q.created_at DESC, q.id DESC LIMIT ?"
            ),
            &[owner_id, limit],
        )
        .await
    }

    /// Live questions bookmarked by a user, most recently bookmarked first.
    pub async fn bookmarked_by(&self, user_id: i64) -> Result<Vec<Question>, DbError> {
        self.listing(
            &format!(
                r#"
                {QUESTION_SELECT}
                JOIN bookmarks bm ON bm.question_id = q.id AND bm.user_id = ?
                WHERE q.is_deleted = 0
                ORDER BY bm.created_at DESC, q.id DESC
                "#
            ),
            &[user_id],
        )
        .await
    }

    /// Tags in use on live questions with their question counts.
    ///
    /// Each row is `(tag, question_count, first_question_id)`; the last value
    /// orders tags by when they first appeared.
    pub async fn tag_counts(&self) -> Result<Vec<(String, i64, i64)>, DbError> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT t.tag, COUNT(*) AS question_count, MIN(q.id) AS first_question_id
            FROM question_tags t JOIN questions q ON q.id = t.question_id
            WHERE q.is_deleted = 0
            GROUP BY t.tag
            HAVING COUNT(*) > 0
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
