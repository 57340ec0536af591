//! Profile summary assembly.
//!
//! The summary is recomputed from the tables on every request.

use super::badges::{
    self, AUTOBIOGRAPHER, BadgeSpec, CIVIC_DUTY, CIVIC_DUTY_VOTES, COMMENTATOR,
    COMMENTATOR_COMMENTS, CRITIC, SUFFRAGE, SUFFRAGE_VOTES_PER_DAY, VOX_POPULI,
    VOX_POPULI_VOTES_PER_DAY,
};
use crate::db::{
    ActivityStats, BadgeAward, BadgePosition, BadgeTier, Database, DbError, Profile,
    ReputationEvent, User,
};
use serde::Serialize;

/// Ledger rows shown in the reputation history.
pub const REPUTATION_HISTORY_LEN: i64 = 15;

/// Progress toward one catalog badge.
#[derive(Debug, Clone, Serialize)]
pub struct BadgeProgress {
    #[serde(flatten)]
    pub badge: BadgeSpec,
    pub earned: bool,
    /// `(current, needed)` for counter-based badges.
    pub progress: Option<(i64, i64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub user: PublicUser,
    pub profile: Profile,
    /// Sum of the reputation ledger.
    pub reputation: i64,
    pub stats: ActivityStats,
    pub reputation_history: Vec<ReputationEvent>,
    pub badges: Vec<BadgeAward>,
    pub badge_count: usize,
    pub newest_badge: Option<BadgeAward>,
    /// Catalog progress, the targeted badge first.
    pub next_badges: Vec<BadgeProgress>,
}

/// Answer activity in one tag and the tag badge tier it reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagStanding {
    pub tag: String,
    pub answers: i64,
    pub score: i64,
    pub tier: Option<BadgeTier>,
}

/// User fields safe to show to other users.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub date_joined: i64,
    pub last_login: Option<i64>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            date_joined: user.date_joined,
            last_login: user.last_login,
        }
    }
}

fn counter(current: i64, needed: i64) -> Option<(i64, i64)> {
    Some((current.min(needed), needed))
}

fn progress_for(spec: &BadgeSpec, profile: &Profile, stats: &ActivityStats) -> Option<(i64, i64)> {
    match spec.name {
        AUTOBIOGRAPHER => counter(i64::from(!profile.about_me.trim().is_empty()), 1),
        CRITIC => counter(stats.downvotes_cast, 1),
        SUFFRAGE => counter(stats.votes_last_24h, SUFFRAGE_VOTES_PER_DAY),
        VOX_POPULI => counter(stats.votes_last_24h, VOX_POPULI_VOTES_PER_DAY),
        CIVIC_DUTY => counter(stats.votes_cast, CIVIC_DUTY_VOTES),
        COMMENTATOR => counter(stats.comments, COMMENTATOR_COMMENTS),
        _ => None,
    }
}

/// Build the profile page summary for `user_id`.
pub async fn summary(db: &Database, user_id: i64) -> Result<ProfileSummary, DbError> {
    let user = db
        .accounts()
        .find_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| DbError::not_found("User"))?;
    let profile = db.accounts().profile(user_id).await?;
    let reputation = db.reputation().total(user_id).await?;
    let stats = db.qa().activity(user_id).await?;
    let reputation_history = db
        .reputation()
        .history(user_id, REPUTATION_HISTORY_LEN)
        .await?;
    let awards = db.badges().for_user(user_id).await?;

    let mut next_badges: Vec<_> = badges::CATALOG
        .iter()
        .map(|spec| BadgeProgress {
            badge: *spec,
            earned: awards
                .iter()
                .any(|a| a.position == BadgePosition::Badge && a.name == spec.name),
            progress: progress_for(spec, &profile, &stats),
        })
        .collect();
    if let Some(target) = profile.targeted_badge.as_deref() {
        next_badges.sort_by_key(|b| b.badge.name != target);
    }

    Ok(ProfileSummary {
        user: user.into(),
        reputation,
        stats,
        reputation_history,
        badge_count: awards.len(),
        newest_badge: awards.last().cloned(),
        badges: awards,
        next_badges,
        profile,
    })
}

/// Tags a user answered in, with the tag badge tier their score reached.
pub async fn tag_standings(db: &Database, user_id: i64) -> Result<Vec<TagStanding>, DbError> {
    let tags = db.qa().answered_tags(user_id).await?;
    Ok(tags
        .into_iter()
        .map(|t| TagStanding {
            tier: badges::tag_tier(t.score),
            tag: t.tag,
            answers: t.answers,
            score: t.score,
        })
        .collect())
}

/// Point the profile at a catalog badge, or clear the target with `None`.
pub async fn set_badge_target(
    db: &Database,
    user_id: i64,
    badge: Option<&str>,
) -> Result<Option<&'static str>, DbError> {
    let target = match badge.map(str::trim).filter(|b| !b.is_empty()) {
        None => None,
        Some(name) => Some(
            badges::lookup(name)
                .ok_or_else(|| DbError::invalid(format!("Unknown badge \"{name}\".")))?
                .name,
        ),
    };
    db.accounts().set_targeted_badge(user_id, target).await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::user;
    use crate::db::{VoteDirection, VoteTarget};
    use crate::services::badges::BadgeService;

    #[tokio::test]
    async fn summary_reflects_ledger_and_badges() {
        let db = Database::new(":memory:").await.unwrap();
        let asker = user(&db, "asker").await;
        let voter = user(&db, "voter").await;

        let question = db
            .qa()
            .ask(asker.id, "What is a monad?", "Explain it without category theory.", &["haskell"])
            .await
            .unwrap();
        db.qa()
            .vote(voter.id, VoteTarget::Question(question.id), VoteDirection::Up)
            .await
            .unwrap();
        let about = crate::db::ProfileUpdate {
            about_me: Some("Functional programming fan".into()),
            ..Default::default()
        };
        db.accounts().update_profile(asker.id, &about).await.unwrap();
        BadgeService::new(&db)
            .after_profile_edit(asker.id, "Functional programming fan")
            .await
            .unwrap();

        let summary = summary(&db, asker.id).await.unwrap();
        assert_eq!(summary.reputation, 10);
        assert_eq!(summary.reputation, summary.profile.reputation);
        assert_eq!(summary.stats.questions, 1);
        assert_eq!(summary.reputation_history.len(), 1);
        assert_eq!(summary.badge_count, 1);
        assert_eq!(
            summary.newest_badge.as_ref().map(|b| b.name.as_str()),
            Some(AUTOBIOGRAPHER)
        );

        let autobiographer = summary
            .next_badges
            .iter()
            .find(|b| b.badge.name == AUTOBIOGRAPHER)
            .unwrap();
        assert!(autobiographer.earned);
        assert_eq!(autobiographer.progress, Some((1, 1)));

        let voter_summary = super::summary(&db, voter.id).await.unwrap();
        assert_eq!(voter_summary.stats.votes_cast, 1);
        let civic = voter_summary
            .next_badges
            .iter()
            .find(|b| b.badge.name == CIVIC_DUTY)
            .unwrap();
        assert_eq!(civic.progress, Some((1, CIVIC_DUTY_VOTES)));
    }

    #[tokio::test]
    async fn targeted_badge_leads_next_badges() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;

        assert_eq!(
            set_badge_target(&db, ram.id, Some(" Vox Populi ")).await.unwrap(),
            Some(VOX_POPULI)
        );
        let summary = summary(&db, ram.id).await.unwrap();
        assert_eq!(summary.profile.targeted_badge.as_deref(), Some(VOX_POPULI));
        assert_eq!(summary.next_badges[0].badge.name, VOX_POPULI);
        assert_eq!(summary.next_badges.len(), badges::CATALOG.len());

        assert!(matches!(
            set_badge_target(&db, ram.id, Some("Astronaut")).await,
            Err(DbError::Invalid(_))
        ));
        assert_eq!(set_badge_target(&db, ram.id, Some("")).await.unwrap(), None);
        assert_eq!(db.accounts().profile(ram.id).await.unwrap().targeted_badge, None);
    }

    #[tokio::test]
    async fn tag_standings_carry_badge_tier() {
        let db = Database::new(":memory:").await.unwrap();
        let asker = user(&db, "asker").await;
        let helper = user(&db, "helper").await;

        let question = db
            .qa()
            .ask(asker.id, "Borrowing question", "Why does this borrow fail?", &["rust"])
            .await
            .unwrap();
        let answer = db
            .qa()
            .answer(helper.id, question.id, "Because the borrow outlives its owner.")
            .await
            .unwrap();
        db.qa()
            .vote(asker.id, VoteTarget::Answer(answer.id), VoteDirection::Up)
            .await
            .unwrap();

        let standings = tag_standings(&db, helper.id).await.unwrap();
        assert_eq!(
            standings,
            vec![TagStanding {
                tag: "rust".into(),
                answers: 1,
                score: 1,
                tier: None,
            }]
        );

        for i in 0..9 {
            let voter = user(&db, &format!("voter{i}")).await;
            db.qa()
                .vote(voter.id, VoteTarget::Answer(answer.id), VoteDirection::Up)
                .await
                .unwrap();
        }
        let standings = tag_standings(&db, helper.id).await.unwrap();
        assert_eq!(standings[0].score, 10);
        assert_eq!(standings[0].tier, Some(BadgeTier::Bronze));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let db = Database::new(":memory:").await.unwrap();
        assert!(matches!(summary(&db, 42).await, Err(DbError::NotFound(_))));
    }
}
