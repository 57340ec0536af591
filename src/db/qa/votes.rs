//! Vote toggles, bookmarks and bounties.
//!
//! Each vote change posts its reputation effects in the same transaction as
//! the vote row, and undoing a vote posts the compensating entries.

use super::QaRepository;
use crate::db::notifications::{NotificationKind, push};
use crate::db::reputation::{ReputationReason, post};
use crate::db::{Actor, DbError, now};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn value(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    fn from_value(value: i64) -> Self {
        if value > 0 { Self::Up } else { Self::Down }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Question(i64),
    Answer(i64),
}

/// State after a vote toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub score: i64,
    pub user_vote: Option<VoteDirection>,
    /// Owner of the voted post, for follow-up badge checks.
    #[serde(skip)]
    pub post_owner_id: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Bounty {
    pub id: i64,
    pub question_id: i64,
    pub offered_by: i64,
    pub amount: i64,
    pub offered_at: i64,
    pub awarded_answer_id: Option<i64>,
    pub awarded_at: Option<i64>,
}

/// Reputation entries for one vote in one direction; `sign` is -1 to undo.
async fn apply_vote_reputation(
    conn: &mut SqliteConnection,
    target: VoteTarget,
    owner_id: i64,
    voter_id: i64,
    direction: VoteDirection,
    sign: i64,
) -> Result<(), DbError> {
    let (question_id, answer_id) = match target {
        VoteTarget::Question(id) => (Some(id), None),
        VoteTarget::Answer(id) => (None, Some(id)),
    };
    let reason = match (target, direction) {
        (VoteTarget::Question(_), VoteDirection::Up) => ReputationReason::QuestionUpvoted,
        (VoteTarget::Question(_), VoteDirection::Down) => ReputationReason::QuestionDownvoted,
        (VoteTarget::Answer(_), VoteDirection::Up) => ReputationReason::AnswerUpvoted,
        (VoteTarget::Answer(_), VoteDirection::Down) => ReputationReason::AnswerDownvoted,
    };
    post(conn, owner_id, sign * reason.points(), reason, question_id, answer_id).await?;

    if matches!(target, VoteTarget::Answer(_)) && direction == VoteDirection::Down {
        let cast = ReputationReason::DownvoteCast;
        post(conn, voter_id, sign * cast.points(), cast, question_id, answer_id).await?;
    }
    Ok(())
}

impl<'a> QaRepository<'a> {
    /// Cast, flip or retract a vote.
    ///
    /// Voting the same direction twice removes the vote; the opposite
    /// direction flips it. Voting on your own post is rejected.
    pub async fn vote(
        &self,
        voter_id: i64,
        target: VoteTarget,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, DbError> {
        let (owner_sql, existing_sql, insert_sql, update_sql, delete_sql, score_sql, id) =
            match target {
                VoteTarget::Question(id) => (
                    "SELECT owner_id FROM questions WHERE id = ? AND is_deleted = 0",
                    "SELECT direction FROM question_votes WHERE question_id = ? AND user_id = ?",
                    "INSERT INTO question_votes (question_id, user_id, direction, created_at) VALUES (?, ?, ?, ?)",
                    "UPDATE question_votes SET direction = ?, created_at = ? WHERE question_id = ? AND user_id = ?",
                    "DELETE FROM question_votes WHERE question_id = ? AND user_id = ?",
                    "SELECT COALESCE(SUM(direction), 0) FROM question_votes WHERE question_id = ?",
                    id,
                ),
                VoteTarget::Answer(id) => (
                    "SELECT owner_id FROM answers WHERE id = ? AND is_deleted = 0",
                    "SELECT direction FROM answer_votes WHERE answer_id = ? AND user_id = ?",
                    "INSERT INTO answer_votes (answer_id, user_id, direction, created_at) VALUES (?, ?, ?, ?)",
                    "UPDATE answer_votes SET direction = ?, created_at = ? WHERE answer_id = ? AND user_id = ?",
                    "DELETE FROM answer_votes WHERE answer_id = ? AND user_id = ?",
                    "SELECT COALESCE(SUM(direction), 0) FROM answer_votes WHERE answer_id = ?",
                    id,
                ),
            };

        let mut tx = self.pool.begin().await?;

        let owner_id: i64 = sqlx::query_scalar(owner_sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| match target {
                VoteTarget::Question(_) => DbError::not_found("Question"),
                VoteTarget::Answer(_) => DbError::not_found("Answer"),
            })?;
        if owner_id == voter_id {
            return Err(DbError::invalid("You cannot vote on your own post."));
        }

        let existing: Option<i64> = sqlx::query_scalar(existing_sql)
            .bind(id)
            .bind(voter_id)
            .fetch_optional(&mut *tx)
            .await?;
        let existing = existing.map(VoteDirection::from_value);

        let user_vote = match existing {
            None => {
                sqlx::query(insert_sql)
                    .bind(id)
                    .bind(voter_id)
                    .bind(direction.value())
                    .bind(now())
                    .execute(&mut *tx)
                    .await?;
                apply_vote_reputation(&mut tx, target, owner_id, voter_id, direction, 1).await?;
                Some(direction)
            }
            Some(previous) if previous == direction => {
                sqlx::query(delete_sql)
                    .bind(id)
                    .bind(voter_id)
                    .execute(&mut *tx)
                    .await?;
                apply_vote_reputation(&mut tx, target, owner_id, voter_id, previous, -1).await?;
                None
            }
            Some(previous) => {
                sqlx::query(update_sql)
                    .bind(direction.value())
                    .bind(now())
                    .bind(id)
                    .bind(voter_id)
                    .execute(&mut *tx)
                    .await?;
                apply_vote_reputation(&mut tx, target, owner_id, voter_id, previous, -1).await?;
                apply_vote_reputation(&mut tx, target, owner_id, voter_id, direction, 1).await?;
                Some(direction)
            }
        };

        let score: i64 = sqlx::query_scalar(score_sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(VoteOutcome {
            score,
            user_vote,
            post_owner_id: owner_id,
        })
    }

    /// Toggle a bookmark. Returns `true` when the question is now bookmarked.
    pub async fn toggle_bookmark(&self, user_id: i64, question_id: i64) -> Result<bool, DbError> {
        self.question(question_id).await?;

        let removed = sqlx::query("DELETE FROM bookmarks WHERE question_id = ? AND user_id = ?")
            .bind(question_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if removed.rows_affected() > 0 {
            return Ok(false);
        }

        sqlx::query("INSERT INTO bookmarks (question_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(question_id)
            .bind(user_id)
            .bind(now())
            .execute(self.pool)
            .await?;
        Ok(true)
    }

    /// Offer a bounty on a live question, paid from the offerer's reputation.
    pub async fn offer_bounty(
        &self,
        offerer_id: i64,
        question_id: i64,
        amount: i64,
    ) -> Result<Bounty, DbError> {
        if amount <= 0 {
            return Err(DbError::invalid("Bounty amount must be positive."));
        }
        let question = self.question(question_id).await?;
        if question.is_bountied {
            return Err(DbError::AlreadyExists(
                "This question already has an open bounty.".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let reputation: i64 = sqlx::query_scalar("SELECT reputation FROM profiles WHERE user_id = ?")
            .bind(offerer_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Profile"))?;
        if reputation < amount {
            return Err(DbError::invalid(format!(
                "You need at least {amount} reputation to offer this bounty."
            )));
        }

        let id = sqlx::query(
            "INSERT INTO bounties (question_id, offered_by, amount, offered_at) VALUES (?, ?, ?, ?)",
        )
        .bind(question_id)
        .bind(offerer_id)
        .bind(amount)
        .bind(now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE questions SET is_bountied = 1 WHERE id = ?")
            .bind(question_id)
            .execute(&mut *tx)
            .await?;

        post(
            &mut tx,
            offerer_id,
            -amount,
            ReputationReason::BountyOffered,
            Some(question_id),
            None,
        )
        .await?;

        let bounty = sqlx::query_as::<_, Bounty>(
            r#"
            SELECT id, question_id, offered_by, amount, offered_at, awarded_answer_id, awarded_at
            FROM bounties WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(bounty)
    }

    /// Award the open bounty of a question to one of its answers (question owner only).
    ///
    /// Returns the awarded amount.
    pub async fn award_bounty(
        &self,
        actor: &Actor,
        question_id: i64,
        answer_id: i64,
    ) -> Result<i64, DbError> {
        let question = self.question(question_id).await?;
        if question.owner_id != actor.id {
            return Err(DbError::denied("Only the question owner can award the bounty."));
        }
        if !question.is_bountied {
            return Err(DbError::invalid("This question has no open bounty."));
        }
        let answer = self.answer_row(answer_id, actor.id).await?;
        if answer.is_deleted || answer.question_id != question_id {
            return Err(DbError::invalid("Answer does not belong to this question."));
        }

        let mut tx = self.pool.begin().await?;

        let open = sqlx::query_as::<_, (i64, i64)>(
            "SELECT offered_by, amount FROM bounties WHERE question_id = ? AND awarded_at IS NULL",
        )
        .bind(question_id)
        .fetch_all(&mut *tx)
        .await?;
        if open.iter().any(|(offered_by, _)| *offered_by == answer.owner_id) {
            return Err(DbError::invalid("A bounty cannot be awarded to its own offerer."));
        }
        let amount: i64 = open.iter().map(|(_, amount)| amount).sum();

        sqlx::query(
            "UPDATE bounties SET awarded_answer_id = ?, awarded_at = ? WHERE question_id = ? AND awarded_at IS NULL",
        )
        .bind(answer_id)
        .bind(now())
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE questions SET is_bountied = 0 WHERE id = ?")
            .bind(question_id)
            .execute(&mut *tx)
            .await?;

        post(
            &mut tx,
            answer.owner_id,
            amount,
            ReputationReason::BountyAwarded,
            Some(question_id),
            Some(answer_id),
        )
        .await?;

        push(
            &mut tx,
            answer.owner_id,
            Some(actor.id),
            NotificationKind::BountyAwarded,
            &format!("You were awarded a +{amount} bounty on \"{}\"", question.title),
            Some(&format!("/questions/{question_id}")),
        )
        .await?;

        tx.commit().await?;
        Ok(amount)
    }

    /// Bounties offered by a user, newest first.
    pub async fn bounties_by(&self, user_id: i64) -> Result<Vec<Bounty>, DbError> {
        let rows = sqlx::query_as::<_, Bounty>(
            r#"
            SELECT id, question_id, offered_by, amount, offered_at, awarded_answer_id, awarded_at
            FROM bounties WHERE offered_by = ?
            ORDER BY offered_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::HotWindow;
    use super::super::test_support::{actor, user};
    use super::*;
    use crate::db::Database;

    async fn rep(db: &Database, user_id: i64) -> i64 {
        db.accounts().profile(user_id).await.unwrap().reputation
    }

    #[tokio::test]
    async fn question_vote_toggle_semantics() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let qa = db.qa();
        let q = qa
            .ask(ram.id, "Voting semantics", "Up, down, and undo.", &["meta"])
            .await
            .unwrap();
        let target = VoteTarget::Question(q.id);

        let up = qa.vote(sita.id, target, VoteDirection::Up).await.unwrap();
        assert_eq!((up.score, up.user_vote), (1, Some(VoteDirection::Up)));
        assert_eq!(rep(&db, ram.id).await, 10);

        let flipped = qa.vote(sita.id, target, VoteDirection::Down).await.unwrap();
        assert_eq!((flipped.score, flipped.user_vote), (-1, Some(VoteDirection::Down)));
        assert_eq!(rep(&db, ram.id).await, -2);
        // Question downvotes cost the voter nothing.
        assert_eq!(rep(&db, sita.id).await, 0);

        let undone = qa.vote(sita.id, target, VoteDirection::Down).await.unwrap();
        assert_eq!((undone.score, undone.user_vote), (0, None));
        assert_eq!(rep(&db, ram.id).await, 0);
        assert_eq!(db.reputation().total(ram.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn answer_downvote_costs_the_voter() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let qa = db.qa();
        let q = qa
            .ask(ram.id, "Downvote costs", "Who pays for a downvote?", &["meta"])
            .await
            .unwrap();
        let a = qa.answer(sita.id, q.id, "The voter pays one point.").await.unwrap();

        qa.vote(ram.id, VoteTarget::Answer(a.id), VoteDirection::Down)
            .await
            .unwrap();
        assert_eq!(rep(&db, sita.id).await, -2);
        assert_eq!(rep(&db, ram.id).await, -1);

        qa.vote(ram.id, VoteTarget::Answer(a.id), VoteDirection::Up)
            .await
            .unwrap();
        assert_eq!(rep(&db, sita.id).await, 10);
        assert_eq!(rep(&db, ram.id).await, 0);
    }

    #[tokio::test]
    async fn cannot_vote_on_own_post() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let qa = db.qa();
        let q = qa
            .ask(ram.id, "Self voting", "Can I upvote myself?", &["meta"])
            .await
            .unwrap();
        assert!(matches!(
            qa.vote(ram.id, VoteTarget::Question(q.id), VoteDirection::Up).await,
            Err(DbError::Invalid(_))
        ));
        assert!(matches!(
            qa.vote(ram.id, VoteTarget::Question(9999), VoteDirection::Up).await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn bookmark_toggles() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let qa = db.qa();
        let q = qa
            .ask(ram.id, "Bookmarking", "Save this for later.", &["meta"])
            .await
            .unwrap();
        assert!(qa.toggle_bookmark(ram.id, q.id).await.unwrap());
        assert_eq!(qa.bookmarked_by(ram.id).await.unwrap().len(), 1);
        assert!(!qa.toggle_bookmark(ram.id, q.id).await.unwrap());
        assert!(qa.bookmarked_by(ram.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bounty_offer_and_award() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let hari = user(&db, "hari").await;
        let qa = db.qa();

        // Give ram something to spend.
        let seed = qa
            .ask(ram.id, "Seed question", "Earning some reputation.", &["meta"])
            .await
            .unwrap();
        qa.vote(sita.id, VoteTarget::Question(seed.id), VoteDirection::Up)
            .await
            .unwrap();
        qa.vote(hari.id, VoteTarget::Question(seed.id), VoteDirection::Up)
            .await
            .unwrap();
        assert_eq!(rep(&db, ram.id).await, 20);

        let q = qa
            .ask(ram.id, "Bounty question", "Hard problem, paying well.", &["rust"])
            .await
            .unwrap();
        assert!(qa.offer_bounty(ram.id, q.id, 50).await.is_err());
        let bounty = qa.offer_bounty(ram.id, q.id, 15).await.unwrap();
        assert_eq!(bounty.amount, 15);
        assert_eq!(rep(&db, ram.id).await, 5);
        assert!(qa.question(q.id).await.unwrap().is_bountied);
        assert_eq!(qa.question(q.id).await.unwrap().bounty_amount, 15);
        assert!(matches!(
            qa.offer_bounty(ram.id, q.id, 1).await,
            Err(DbError::AlreadyExists(_))
        ));

        let a = qa.answer(sita.id, q.id, "Here is the solution.").await.unwrap();
        assert!(qa.award_bounty(&actor(&sita), q.id, a.id).await.is_err());
        assert_eq!(qa.award_bounty(&actor(&ram), q.id, a.id).await.unwrap(), 15);
        assert_eq!(rep(&db, sita.id).await, 15);

        let after = qa.question(q.id).await.unwrap();
        assert!(!after.is_bountied);
        assert_eq!(after.bounty_amount, 0);
        assert_eq!(qa.bounties_by(ram.id).await.unwrap()[0].awarded_answer_id, Some(a.id));
        assert!(qa.award_bounty(&actor(&ram), q.id, a.id).await.is_err());
    }

    #[tokio::test]
    async fn hot_listing_counts_recent_upvotes_and_answers() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let qa = db.qa();
        let quiet = qa
            .ask(ram.id, "Quiet question", "Nobody cares about this.", &["meta"])
            .await
            .unwrap();
        let busy = qa
            .ask(ram.id, "Busy question", "Everyone has an opinion.", &["meta"])
            .await
            .unwrap();
        qa.vote(sita.id, VoteTarget::Question(busy.id), VoteDirection::Up)
            .await
            .unwrap();
        qa.answer(sita.id, busy.id, "My opinion is this one.").await.unwrap();

        let hot = qa.hot(HotWindow::Week, 50).await.unwrap();
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].id, busy.id);
        assert!(hot.iter().all(|q| q.id != quiet.id));
    }
}
