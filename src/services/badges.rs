//! Badge catalog and award rules.
//!
//! Rules run inline after the action that can satisfy them (a vote, a
//! comment, a bounty, a profile edit). Every rule is idempotent: the award
//! table is unique per (user, name, tier, position), so re-running a rule for a
//! badge already held does nothing.

use crate::db::{BadgePosition, BadgeTier, Database, DbError, VoteDirection, VoteOutcome, VoteTarget};
use serde::Serialize;
use tracing::info;

/// One entry of the static badge catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BadgeSpec {
    pub name: &'static str,
    pub tier: BadgeTier,
    pub description: &'static str,
}

const fn spec(name: &'static str, tier: BadgeTier, description: &'static str) -> BadgeSpec {
    BadgeSpec {
        name,
        tier,
        description,
    }
}

pub const AUTOBIOGRAPHER: &str = "Autobiographer";
pub const CRITIC: &str = "Critic";
pub const SUFFRAGE: &str = "Suffrage";
pub const VOX_POPULI: &str = "Vox Populi";
pub const CIVIC_DUTY: &str = "Civic Duty";
pub const INVESTOR: &str = "Investor";
pub const PROMOTER: &str = "Promoter";
pub const TEACHER: &str = "Teacher";
pub const SELF_LEARNER: &str = "Self-Learner";
pub const COMMENTATOR: &str = "Commentator";

pub const SUFFRAGE_VOTES_PER_DAY: i64 = 30;
pub const VOX_POPULI_VOTES_PER_DAY: i64 = 40;
pub const CIVIC_DUTY_VOTES: i64 = 300;
pub const COMMENTATOR_COMMENTS: i64 = 10;
pub const TEACHER_ANSWER_SCORE: i64 = 1;
pub const SELF_LEARNER_ANSWER_SCORE: i64 = 3;

/// Answer score needed within a tag for each tag badge tier.
pub const TAG_THRESHOLDS: [(i64, BadgeTier); 3] = [
    (10, BadgeTier::Bronze),
    (40, BadgeTier::Silver),
    (100, BadgeTier::Gold),
];

pub static CATALOG: &[BadgeSpec] = &[
    spec(AUTOBIOGRAPHER, BadgeTier::Bronze, "Completed the \"About me\" section of the profile."),
    spec("Benefactor", BadgeTier::Bronze, "First bounty you manually award on another person's question."),
    spec("Citizen Patrol", BadgeTier::Bronze, "First flagged post."),
    spec(CIVIC_DUTY, BadgeTier::Silver, "Voted 300 or more times."),
    spec(COMMENTATOR, BadgeTier::Bronze, "Left 10 comments."),
    spec(CRITIC, BadgeTier::Bronze, "First down vote."),
    spec("Disciplined", BadgeTier::Bronze, "Deleted own post with score of 3 or higher."),
    spec("Excavator", BadgeTier::Bronze, "Edited first post that was inactive for 6 months."),
    spec(INVESTOR, BadgeTier::Bronze, "First bounty you offer on another person's question."),
    spec("Marshal", BadgeTier::Gold, "Achieved 500 helpful flags."),
    spec("Necromancer", BadgeTier::Silver, "Answered a question more than 60 days later with score of 5 or more."),
    spec("Peer Pressure", BadgeTier::Bronze, "Deleted own post with score of -3 or lower."),
    spec(PROMOTER, BadgeTier::Bronze, "First bounty you offer on your own question."),
    spec("Proofreader", BadgeTier::Bronze, "Approved or rejected 100 suggested edits."),
    spec("Refiner", BadgeTier::Silver, "Answered 50 questions with score of 2 or more."),
    spec("Revival", BadgeTier::Bronze, "Answered more than 30 days after a question was asked as first answer scoring 2 or more."),
    spec(SELF_LEARNER, BadgeTier::Silver, "Answered your own question with score of 3 or more."),
    spec("Strunk & White", BadgeTier::Silver, "Edited 80 posts."),
    spec(SUFFRAGE, BadgeTier::Bronze, "Used 30 votes in a day."),
    spec(TEACHER, BadgeTier::Silver, "Answered a question with score of 1 or more."),
    spec(VOX_POPULI, BadgeTier::Bronze, "Used the maximum 40 votes in a day."),
];

pub fn lookup(name: &str) -> Option<&'static BadgeSpec> {
    CATALOG.iter().find(|b| b.name == name)
}

/// Tier a tag badge reaches for the given accumulated answer score.
pub fn tag_tier(score: i64) -> Option<BadgeTier> {
    TAG_THRESHOLDS
        .iter()
        .rev()
        .find(|(needed, _)| score >= *needed)
        .map(|(_, tier)| *tier)
}

/// Runs badge rules against the database.
pub struct BadgeService<'a> {
    db: &'a Database,
}

impl<'a> BadgeService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Grant a catalog badge. Returns true when newly awarded.
    async fn grant(&self, user_id: i64, name: &'static str) -> Result<bool, DbError> {
        let Some(badge) = lookup(name) else {
            return Err(DbError::Internal(format!("unknown badge {name}")));
        };
        self.grant_as(user_id, badge.name, badge.tier, BadgePosition::Badge)
            .await
    }

    async fn grant_as(
        &self,
        user_id: i64,
        name: &str,
        tier: BadgeTier,
        position: BadgePosition,
    ) -> Result<bool, DbError> {
        let awarded = self.db.badges().award(user_id, name, tier, position).await?;
        if awarded {
            crate::metrics::record_badge(&format!("{tier:?}"));
            info!(user_id, badge = %name, tier = ?tier, position = ?position, "Badge awarded");
        }
        Ok(awarded)
    }

    /// Autobiographer for a non-empty "about me".
    pub async fn after_profile_edit(&self, user_id: i64, about_me: &str) -> Result<Vec<String>, DbError> {
        let mut awarded = Vec::new();
        if !about_me.trim().is_empty() && self.grant(user_id, AUTOBIOGRAPHER).await? {
            awarded.push(AUTOBIOGRAPHER.to_string());
        }
        Ok(awarded)
    }

    /// Voter badges (Critic, Suffrage, Vox Populi, Civic Duty) and answer
    /// score badges for the post owner.
    pub async fn after_vote(
        &self,
        voter_id: i64,
        target: VoteTarget,
        outcome: &VoteOutcome,
    ) -> Result<Vec<String>, DbError> {
        let qa = self.db.qa();
        let mut awarded = Vec::new();

        if outcome.user_vote == Some(VoteDirection::Down)
            && qa.downvotes_cast(voter_id).await? >= 1
            && self.grant(voter_id, CRITIC).await?
        {
            awarded.push(CRITIC.to_string());
        }

        let last_day = qa.votes_cast(voter_id, Some(crate::db::now() - 86_400)).await?;
        for (name, needed) in [(SUFFRAGE, SUFFRAGE_VOTES_PER_DAY), (VOX_POPULI, VOX_POPULI_VOTES_PER_DAY)] {
            if last_day >= needed && self.grant(voter_id, name).await? {
                awarded.push(name.to_string());
            }
        }
        if qa.votes_cast(voter_id, None).await? >= CIVIC_DUTY_VOTES
            && self.grant(voter_id, CIVIC_DUTY).await?
        {
            awarded.push(CIVIC_DUTY.to_string());
        }

        if let VoteTarget::Answer(answer_id) = target {
            awarded.extend(self.after_answer_score(answer_id).await?);
        }
        Ok(awarded)
    }

    /// Teacher, Self-Learner and tag badges driven by an answer's score.
    pub async fn after_answer_score(&self, answer_id: i64) -> Result<Vec<String>, DbError> {
        let qa = self.db.qa();
        let Some((answer_owner, question_owner, score)) = qa.answer_score_info(answer_id).await?
        else {
            return Ok(Vec::new());
        };

        let mut awarded = Vec::new();
        if score >= TEACHER_ANSWER_SCORE && self.grant(answer_owner, TEACHER).await? {
            awarded.push(TEACHER.to_string());
        }
        if answer_owner == question_owner
            && score >= SELF_LEARNER_ANSWER_SCORE
            && self.grant(answer_owner, SELF_LEARNER).await?
        {
            awarded.push(SELF_LEARNER.to_string());
        }

        for (tag, tag_score) in qa.tag_answer_scores(answer_owner).await? {
            for (needed, tier) in TAG_THRESHOLDS {
                if tag_score >= needed
                    && self
                        .grant_as(answer_owner, &tag, tier, BadgePosition::Tag)
                        .await?
                {
                    awarded.push(format!("{tag} ({tier:?})"));
                }
            }
        }
        Ok(awarded)
    }

    pub async fn after_comment(&self, author_id: i64) -> Result<Vec<String>, DbError> {
        let mut awarded = Vec::new();
        if self.db.qa().comments_count(author_id).await? >= COMMENTATOR_COMMENTS
            && self.grant(author_id, COMMENTATOR).await?
        {
            awarded.push(COMMENTATOR.to_string());
        }
        Ok(awarded)
    }

    /// Investor for a bounty on someone else's question, Promoter for one's own.
    pub async fn after_bounty(&self, offerer_id: i64) -> Result<Vec<String>, DbError> {
        let qa = self.db.qa();
        let mut awarded = Vec::new();
        if qa.has_bounty_on_others(offerer_id).await? && self.grant(offerer_id, INVESTOR).await? {
            awarded.push(INVESTOR.to_string());
        }
        if qa.has_bounty_on_own(offerer_id).await? && self.grant(offerer_id, PROMOTER).await? {
            awarded.push(PROMOTER.to_string());
        }
        Ok(awarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::user;

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<_> = CATALOG.iter().map(|b| b.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CATALOG.len());
        assert_eq!(lookup(TEACHER).map(|b| b.tier), Some(BadgeTier::Silver));
        assert!(lookup("Nope").is_none());
    }

    #[test]
    fn tag_tiers_follow_thresholds() {
        assert_eq!(tag_tier(9), None);
        assert_eq!(tag_tier(10), Some(BadgeTier::Bronze));
        assert_eq!(tag_tier(40), Some(BadgeTier::Silver));
        assert_eq!(tag_tier(250), Some(BadgeTier::Gold));
    }

    #[tokio::test]
    async fn autobiographer_is_awarded_once() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let badges = BadgeService::new(&db);

        assert!(badges.after_profile_edit(ram.id, "   ").await.unwrap().is_empty());
        assert_eq!(
            badges.after_profile_edit(ram.id, "CS student").await.unwrap(),
            vec![AUTOBIOGRAPHER]
        );
        assert!(badges.after_profile_edit(ram.id, "Still here").await.unwrap().is_empty());

        let private = db.notifications().list_private(ram.id, 10).await.unwrap();
        assert_eq!(private.len(), 1);
    }

    #[tokio::test]
    async fn downvote_and_answer_score_badges() {
        let db = Database::new(":memory:").await.unwrap();
        let asker = user(&db, "asker").await;
        let helper = user(&db, "helper").await;
        let voter = user(&db, "voter").await;

        let qa = db.qa();
        let question = qa
            .ask(asker.id, "How do lifetimes work?", "I keep fighting the borrow checker.", &["rust"])
            .await
            .unwrap();
        let answer = qa
            .answer(helper.id, question.id, "Think of them as scopes of borrows.")
            .await
            .unwrap();

        let badges = BadgeService::new(&db);
        let target = VoteTarget::Question(question.id);
        let outcome = qa.vote(voter.id, target, VoteDirection::Down).await.unwrap();
        assert_eq!(badges.after_vote(voter.id, target, &outcome).await.unwrap(), vec![CRITIC]);

        let target = VoteTarget::Answer(answer.id);
        let outcome = qa.vote(voter.id, target, VoteDirection::Up).await.unwrap();
        let awarded = badges.after_vote(voter.id, target, &outcome).await.unwrap();
        assert_eq!(awarded, vec![TEACHER]);
        assert!(
            db.badges()
                .has(helper.id, TEACHER, BadgePosition::Badge)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn bounty_badges_distinguish_own_question() {
        let db = Database::new(":memory:").await.unwrap();
        let asker = user(&db, "asker").await;
        let sponsor = user(&db, "sponsor").await;
        let qa = db.qa();

        let question = qa
            .ask(asker.id, "Why is my query slow?", "EXPLAIN shows a full table scan.", &["sql"])
            .await
            .unwrap();
        sqlx::query("UPDATE profiles SET reputation = 500 WHERE user_id = ?")
            .bind(sponsor.id)
            .execute(db.pool())
            .await
            .unwrap();
        qa.offer_bounty(sponsor.id, question.id, 50).await.unwrap();

        let badges = BadgeService::new(&db);
        assert_eq!(badges.after_bounty(sponsor.id).await.unwrap(), vec![INVESTOR]);
        assert!(badges.after_bounty(sponsor.id).await.unwrap().is_empty());
    }
}
