//! Badge award storage.
//!
//! Awards are unique per (user, name, tier, position). Granting a badge also
//! raises a `BADGE_EARNED` private notification in the same transaction.

use super::notifications::{PrivateNotificationKind, push_private};
use super::accounts::{SUMMARY_COLUMNS, UserSummary};
use super::{DbError, is_unique_violation, now};
use serde::Serialize;
use sqlx::SqlitePool;

/// Badge tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
pub enum BadgeTier {
    Bronze,
    Silver,
    Gold,
}

/// Whether an award is a catalog badge or a per-tag badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BadgePosition {
    Badge,
    Tag,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BadgeAward {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub tier: BadgeTier,
    pub position: BadgePosition,
    pub awarded_at: i64,
}

/// A user holding a badge, with the award that put them there.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BadgeHolder {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: UserSummary,
    pub tier: BadgeTier,
    pub position: BadgePosition,
    pub awarded_at: i64,
}

/// Repository for badge awards.
pub struct BadgeRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BadgeRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Grant a badge. Returns `false` when the user already holds it.
    pub async fn award(
        &self,
        user_id: i64,
        name: &str,
        tier: BadgeTier,
        position: BadgePosition,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO badges (user_id, name, tier, position, awarded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(tier)
        .bind(position)
        .bind(now())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let detail = match position {
            BadgePosition::Badge => format!("You earned the {tier:?} badge \"{name}\"."),
            BadgePosition::Tag => format!("You earned the {tier:?} tag badge \"{name}\"."),
        };
        push_private(&mut tx, user_id, PrivateNotificationKind::BadgeEarned, &detail).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// True when the user holds the badge.
    #[cfg(test)]
    pub async fn has(
        &self,
        user_id: i64,
        name: &str,
        position: BadgePosition,
    ) -> Result<bool, DbError> {
        let held: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM badges WHERE user_id = ? AND name = ? AND position = ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(position)
        .fetch_one(self.pool)
        .await?;
        Ok(held)
    }

    /// All awards of a user, oldest first.
    pub async fn for_user(&self, user_id: i64) -> Result<Vec<BadgeAward>, DbError> {
        let rows = sqlx::query_as::<_, BadgeAward>(
            r#"
            SELECT id, user_id, name, tier, position, awarded_at
            FROM badges
            WHERE user_id = ?
            ORDER BY awarded_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Active users holding a badge, newest holders first.
    pub async fn holders(&self, name: &str) -> Result<Vec<BadgeHolder>, DbError> {
        let rows = sqlx::query_as::<_, BadgeHolder>(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS}, b.tier, b.position, b.awarded_at
            FROM badges b
            JOIN users u ON u.id = b.user_id
            JOIN profiles p ON p.user_id = u.id
            WHERE b.name = ? AND u.is_active = 1
            ORDER BY b.awarded_at DESC, b.id DESC
            "#
        ))
        .bind(name)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
