//! Answers, comments and accepting an answer.

use super::{Answer, Comment, CommentTarget, QaRepository};
use crate::db::notifications::{NotificationKind, push};
use crate::db::reputation::{ReputationReason, post};
use crate::db::{Actor, DbError, now};

const MIN_ANSWER_LEN: usize = 10;
const MAX_COMMENT_LEN: usize = 600;

const ANSWER_SELECT: &str = r#"
    SELECT a.id, a.question_id, a.owner_id, u.username AS owner_username, a.body, a.created_at,
           a.edited_at, a.is_deleted,
           COALESCE((SELECT SUM(av.direction) FROM answer_votes av WHERE av.answer_id = a.id), 0)
               AS score,
           EXISTS(SELECT 1 FROM questions q WHERE q.id = a.question_id
                  AND q.accepted_answer_id = a.id) AS is_accepted,
           (SELECT av.direction FROM answer_votes av
            WHERE av.answer_id = a.id AND av.user_id = ?) AS viewer_vote
    FROM answers a JOIN users u ON u.id = a.owner_id
"#;

fn question_link(question_id: i64) -> String {
    format!("/questions/{question_id}")
}

impl<'a> QaRepository<'a> {
    /// Post an answer to a live question and notify its owner.
    pub async fn answer(&self, owner_id: i64, question_id: i64, body: &str) -> Result<Answer, DbError> {
        if body.trim().chars().count() < MIN_ANSWER_LEN {
            return Err(DbError::invalid(format!(
                "Answer must be at least {MIN_ANSWER_LEN} characters long."
            )));
        }
        let question = self.question(question_id).await?;

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            "INSERT INTO answers (question_id, owner_id, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(question_id)
        .bind(owner_id)
        .bind(body.trim())
        .bind(now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        push(
            &mut tx,
            question.owner_id,
            Some(owner_id),
            NotificationKind::Answer,
            &format!("New answer on \"{}\"", question.title),
            Some(&question_link(question_id)),
        )
        .await?;
        tx.commit().await?;

        self.answer_row(id, owner_id).await
    }

    /// Load one answer (including soft-deleted ones), from the viewpoint of `viewer_id`.
    pub async fn answer_row(&self, id: i64, viewer_id: i64) -> Result<Answer, DbError> {
        sqlx::query_as::<_, Answer>(&format!("{ANSWER_SELECT} WHERE a.id = ?"))
            .bind(viewer_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Answer"))
    }

    async fn live_answer(&self, id: i64) -> Result<Answer, DbError> {
        let answer = self.answer_row(id, 0).await?;
        if answer.is_deleted {
            return Err(DbError::not_found("Answer"));
        }
        Ok(answer)
    }

    /// Live answers of a question with their comments: accepted first, then by score.
    pub(super) async fn answers_for(
        &self,
        question_id: i64,
        viewer_id: i64,
    ) -> Result<Vec<Answer>, DbError> {
        let mut answers = sqlx::query_as::<_, Answer>(&format!(
            "{ANSWER_SELECT} WHERE a.question_id = ? AND a.is_deleted = 0 \
             ORDER BY is_accepted DESC, score DESC, a.created_at, a.id"
        ))
        .bind(viewer_id)
        .bind(question_id)
        .fetch_all(self.pool)
        .await?;

        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.question_id, c.answer_id, c.author_id, u.username AS author_username,
                   c.body, c.created_at
            FROM comments c
            JOIN users u ON u.id = c.author_id
            JOIN answers a ON a.id = c.answer_id
            WHERE a.question_id = ?
            ORDER BY c.created_at, c.id
            "#,
        )
        .bind(question_id)
        .fetch_all(self.pool)
        .await?;

        for comment in comments {
            if let Some(answer) = answers.iter_mut().find(|a| Some(a.id) == comment.answer_id) {
                answer.comments.push(comment);
            }
        }
        Ok(answers)
    }

    /// Live answers written by a user, newest first.
    pub async fn answers_by_owner(&self, owner_id: i64, limit: i64) -> Result<Vec<Answer>, DbError> {
        let answers = sqlx::query_as::<_, Answer>(&format!(
            "{ANSWER_SELECT} WHERE a.owner_id = ? AND a.is_deleted = 0 \
             ORDER BY a.created_at DESC, a.id DESC LIMIT ?"
        ))
        .bind(owner_id)
        .bind(owner_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(answers)
    }

    /// Edit an answer body (owner or staff).
    pub async fn edit_answer(&self, actor: &Actor, id: i64, body: &str) -> Result<Answer, DbError> {
        let answer = self.live_answer(id).await?;
        if !actor.can_manage(answer.owner_id) {
            return Err(DbError::denied("You can only edit your own answers."));
        }
        if body.trim().chars().count() < MIN_ANSWER_LEN {
            return Err(DbError::invalid(format!(
                "Answer must be at least {MIN_ANSWER_LEN} characters long."
            )));
        }
        sqlx::query("UPDATE answers SET body = ?, edited_at = ? WHERE id = ?")
            .bind(body.trim())
            .bind(now())
            .bind(id)
            .execute(self.pool)
            .await?;
        self.answer_row(id, actor.id).await
    }

    /// Soft-delete an answer (owner or staff).
    pub async fn delete_answer(&self, actor: &Actor, id: i64) -> Result<(), DbError> {
        let answer = self.live_answer(id).await?;
        if !actor.can_manage(answer.owner_id) {
            return Err(DbError::denied("You can only delete your own answers."));
        }
        sqlx::query("UPDATE answers SET is_deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Comment on a question or an answer and notify the post owner.
    pub async fn comment(
        &self,
        author_id: i64,
        target: CommentTarget,
        body: &str,
    ) -> Result<Comment, DbError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(DbError::invalid("Comment cannot be empty."));
        }
        if body.chars().count() > MAX_COMMENT_LEN {
            return Err(DbError::invalid(format!(
                "Comment must be at most {MAX_COMMENT_LEN} characters long."
            )));
        }

        let (question_id, answer_id, post_owner, question_id_for_link) = match target {
            CommentTarget::Question(id) => {
                let q = self.question(id).await?;
                (Some(id), None, q.owner_id, id)
            }
            CommentTarget::Answer(id) => {
                let a = self.live_answer(id).await?;
                (None, Some(id), a.owner_id, a.question_id)
            }
        };

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            "INSERT INTO comments (question_id, answer_id, author_id, body, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(question_id)
        .bind(answer_id)
        .bind(author_id)
        .bind(body)
        .bind(now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        push(
            &mut tx,
            post_owner,
            Some(author_id),
            NotificationKind::Comment,
            "New comment on your post",
            Some(&question_link(question_id_for_link)),
        )
        .await?;
        tx.commit().await?;

        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.question_id, c.answer_id, c.author_id, u.username AS author_username,
                   c.body, c.created_at
            FROM comments c JOIN users u ON u.id = c.author_id
            WHERE c.id = ?
            "#,
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;
        Ok(comment)
    }

    /// Accept an answer (question owner only).
    ///
    /// Accepting a different answer first reverses the reputation granted for
    /// the previous one. Accepting your own answer grants no reputation.
    pub async fn accept_answer(
        &self,
        actor: &Actor,
        question_id: i64,
        answer_id: i64,
    ) -> Result<(), DbError> {
        let question = self.question(question_id).await?;
        if question.owner_id != actor.id {
            return Err(DbError::denied("Only the question owner can accept an answer."));
        }
        let answer = self.live_answer(answer_id).await?;
        if answer.question_id != question_id {
            return Err(DbError::invalid("Answer does not belong to this question."));
        }
        if question.accepted_answer_id == Some(answer_id) {
            return Err(DbError::AlreadyExists("This answer is already accepted.".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        if let Some(previous_id) = question.accepted_answer_id {
            let previous_owner: Option<i64> =
                sqlx::query_scalar("SELECT owner_id FROM answers WHERE id = ?")
                    .bind(previous_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(previous_owner) = previous_owner
                && previous_owner != question.owner_id
            {
                post(
                    &mut tx,
                    previous_owner,
                    -ReputationReason::AnswerAccepted.points(),
                    ReputationReason::AnswerAccepted,
                    Some(question_id),
                    Some(previous_id),
                )
                .await?;
                post(
                    &mut tx,
                    question.owner_id,
                    -ReputationReason::AcceptedAnAnswer.points(),
                    ReputationReason::AcceptedAnAnswer,
                    Some(question_id),
                    Some(previous_id),
                )
                .await?;
            }
        }

        sqlx::query("UPDATE questions SET accepted_answer_id = ? WHERE id = ?")
            .bind(answer_id)
            .bind(question_id)
            .execute(&mut *tx)
            .await?;

        if answer.owner_id != question.owner_id {
            post(
                &mut tx,
                answer.owner_id,
                ReputationReason::AnswerAccepted.points(),
                ReputationReason::AnswerAccepted,
                Some(question_id),
                Some(answer_id),
            )
            .await?;
            post(
                &mut tx,
                question.owner_id,
                ReputationReason::AcceptedAnAnswer.points(),
                ReputationReason::AcceptedAnAnswer,
                Some(question_id),
                Some(answer_id),
            )
            .await?;
        }

        push(
            &mut tx,
            answer.owner_id,
            Some(actor.id),
            NotificationKind::AcceptedAnswer,
            &format!("Your answer on \"{}\" was accepted", question.title),
            Some(&question_link(question_id)),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{actor, user};
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn answering_notifies_question_owner() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let qa = db.qa();
        let q = qa
            .ask(ram.id, "What is a monad?", "Explain it like I am five.", &["haskell"])
            .await
            .unwrap();

        let a = qa
            .answer(sita.id, q.id, "A burrito, more or less.")
            .await
            .unwrap();
        assert_eq!(a.owner_username, "sita");
        assert!(!a.is_accepted);

        let notes = db.notifications().list(ram.id, 10).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Answer);
        assert_eq!(qa.question(q.id).await.unwrap().answer_count, 1);
    }

    #[tokio::test]
    async fn comments_attach_to_answers_and_questions() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let qa = db.qa();
        let q = qa
            .ask(ram.id, "Comment threading", "Where do comments go?", &["meta"])
            .await
            .unwrap();
        let a = qa.answer(sita.id, q.id, "Under the post they target.").await.unwrap();

        qa.comment(ram.id, CommentTarget::Answer(a.id), "Thanks!").await.unwrap();
        qa.comment(sita.id, CommentTarget::Question(q.id), "Good question")
            .await
            .unwrap();
        assert!(qa.comment(ram.id, CommentTarget::Question(q.id), "   ").await.is_err());

        let detail = qa.detail(q.id, ram.id).await.unwrap();
        assert_eq!(detail.comments.len(), 1);
        assert_eq!(detail.answers[0].comments.len(), 1);
        assert_eq!(detail.answers[0].comments[0].author_username, "ram");

        // sita got notified about ram's comment, ram about sita's answer and comment.
        assert_eq!(db.notifications().list(sita.id, 10).await.unwrap().len(), 1);
        assert_eq!(db.notifications().list(ram.id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn accept_answer_moves_reputation_once() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let hari = user(&db, "hari").await;
        let qa = db.qa();
        let q = qa
            .ask(ram.id, "Accepting answers", "Which one should I accept?", &["meta"])
            .await
            .unwrap();
        let a1 = qa.answer(sita.id, q.id, "Accept mine, it is good.").await.unwrap();
        let a2 = qa.answer(hari.id, q.id, "No, accept mine instead.").await.unwrap();

        assert!(matches!(
            qa.accept_answer(&actor(&sita), q.id, a1.id).await,
            Err(DbError::InsufficientAccess(_))
        ));

        qa.accept_answer(&actor(&ram), q.id, a1.id).await.unwrap();
        let accounts = db.accounts();
        assert_eq!(accounts.profile(sita.id).await.unwrap().reputation, 15);
        assert_eq!(accounts.profile(ram.id).await.unwrap().reputation, 2);
        assert!(matches!(
            qa.accept_answer(&actor(&ram), q.id, a1.id).await,
            Err(DbError::AlreadyExists(_))
        ));

        qa.accept_answer(&actor(&ram), q.id, a2.id).await.unwrap();
        assert_eq!(accounts.profile(sita.id).await.unwrap().reputation, 0);
        assert_eq!(accounts.profile(hari.id).await.unwrap().reputation, 15);
        assert_eq!(accounts.profile(ram.id).await.unwrap().reputation, 2);

        let detail = qa.detail(q.id, ram.id).await.unwrap();
        assert_eq!(detail.question.accepted_answer_id, Some(a2.id));
        assert_eq!(detail.answers[0].id, a2.id);
        assert!(detail.answers[0].is_accepted);
    }

    #[tokio::test]
    async fn edit_and_delete_answer_permissions() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let qa = db.qa();
        let q = qa
            .ask(ram.id, "Editing answers", "Can others edit my answer?", &["meta"])
            .await
            .unwrap();
        let a = qa.answer(sita.id, q.id, "Only you and staff can.").await.unwrap();

        assert!(qa.edit_answer(&actor(&ram), a.id, "Vandalized answer").await.is_err());
        let edited = qa
            .edit_answer(&actor(&sita), a.id, "Only you and moderators can.")
            .await
            .unwrap();
        assert!(edited.edited_at.is_some());

        qa.delete_answer(&actor(&sita), a.id).await.unwrap();
        assert!(qa.detail(q.id, ram.id).await.unwrap().answers.is_empty());
        assert!(qa.edit_answer(&actor(&sita), a.id, "Too late for edits").await.is_err());
    }
}
