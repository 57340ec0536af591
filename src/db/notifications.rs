//! Notification repository.
//!
//! General notifications are addressed to a receiver by an actor (answers,
//! comments, accepted answers, bounties, join requests). Private
//! notifications carry reputation and badge events for a single user.

use super::{DbError, now};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

/// What caused a general notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Answer,
    Comment,
    AcceptedAnswer,
    BountyAwarded,
    JoinRequest,
    JoinApproved,
    JoinRejected,
}

/// What caused a private notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivateNotificationKind {
    BadgeEarned,
    Reputation,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub receiver_id: i64,
    pub actor_id: Option<i64>,
    pub actor_username: Option<String>,
    pub kind: NotificationKind,
    pub text: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PrivateNotification {
    pub id: i64,
    pub user_id: i64,
    pub kind: PrivateNotificationKind,
    pub detail: String,
    pub is_read: bool,
    pub created_at: i64,
}

/// Unread badge counters shown in the page header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnreadCounts {
    pub chat: i64,
    pub general: i64,
    pub private: i64,
    pub total: i64,
}

/// Insert a general notification on the caller's connection.
pub(crate) async fn push(
    conn: &mut SqliteConnection,
    receiver_id: i64,
    actor_id: Option<i64>,
    kind: NotificationKind,
    text: &str,
    link: Option<&str>,
) -> Result<(), DbError> {
    // Acting on your own content is not news.
    if actor_id == Some(receiver_id) {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO notifications (receiver_id, actor_id, kind, text, link, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(receiver_id)
    .bind(actor_id)
    .bind(kind)
    .bind(text)
    .bind(link)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert a private notification on the caller's connection.
pub(crate) async fn push_private(
    conn: &mut SqliteConnection,
    user_id: i64,
    kind: PrivateNotificationKind,
    detail: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO private_notifications (user_id, kind, detail, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(kind)
    .bind(detail)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Repository for notification operations.
pub struct NotificationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Newest general notifications for a user.
    pub async fn list(&self, user_id: i64, limit: i64) -> Result<Vec<Notification>, DbError> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT n.id, n.receiver_id, n.actor_id, u.username AS actor_username, n.kind,
                   n.text, n.link, n.is_read, n.created_at
            FROM notifications n
            LEFT JOIN users u ON u.id = n.actor_id
            WHERE n.receiver_id = ?
            ORDER BY n.created_at DESC, n.id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Newest private notifications for a user.
    pub async fn list_private(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PrivateNotification>, DbError> {
        let rows = sqlx::query_as::<_, PrivateNotification>(
            r#"
            SELECT id, user_id, kind, detail, is_read, created_at
            FROM private_notifications
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

    /// Unread counters across chat, general and private notifications.
    pub async fn unread_counts(&self, user_id: i64) -> Result<UnreadCounts, DbError> {
        let (chat, general, private) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM chat_notifications WHERE user_id = ?1 AND is_read = 0),
                (SELECT COUNT(*) FROM notifications WHERE receiver_id = ?1 AND is_read = 0),
                (SELECT COUNT(*) FROM private_notifications WHERE user_id = ?1 AND is_read = 0)
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(UnreadCounts {
            chat,
            general,
            private,
            total: chat + general + private,
        })
    }

    /// Mark every general notification read.
    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, DbError> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE receiver_id = ? AND is_read = 0")
                .bind(user_id)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Mark every private notification read.
    pub async fn mark_all_private_read(&self, user_id: i64) -> Result<u64, DbError> {
        let result = sqlx::query(
            "UPDATE private_notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete one notification owned by `user_id`.
    pub async fn delete(&self, user_id: i64, notification_id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND receiver_id = ?")
            .bind(notification_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Notification"));
        }
        Ok(())
    }

    /// Delete every general notification of a user, returning the count.
    pub async fn delete_all(&self, user_id: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM notifications WHERE receiver_id = ?")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewAccount};

    async fn setup() -> (Database, i64, i64) {
        let db = Database::new(":memory:").await.unwrap();
        let a = db
            .accounts()
            .create(NewAccount::student("ram", "ram@khec.edu.np", "pw-ram-123"))
            .await
            .unwrap();
        let b = db
            .accounts()
            .create(NewAccount::student("sita", "sita@khec.edu.np", "pw-sita-123"))
            .await
            .unwrap();
        (db, a.id, b.id)
    }

    #[tokio::test]
    async fn push_skips_self_notifications() {
        let (db, ram, sita) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        push(&mut conn, ram, Some(ram), NotificationKind::Comment, "self", None)
            .await
            .unwrap();
        push(&mut conn, ram, Some(sita), NotificationKind::Answer, "sita answered", Some("/q/1"))
            .await
            .unwrap();
        drop(conn);

        let list = db.notifications().list(ram, 10).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].actor_username.as_deref(), Some("sita"));
        assert_eq!(list[0].kind, NotificationKind::Answer);
    }

    #[tokio::test]
    async fn unread_counts_and_read_all() {
        let (db, ram, sita) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        for _ in 0..3 {
            push(&mut conn, ram, Some(sita), NotificationKind::Comment, "c", None)
                .await
                .unwrap();
        }
        push_private(&mut conn, ram, PrivateNotificationKind::BadgeEarned, "Critic")
            .await
            .unwrap();
        drop(conn);

        let repo = db.notifications();
        let counts = repo.unread_counts(ram).await.unwrap();
        assert_eq!(
            counts,
            UnreadCounts {
                chat: 0,
                general: 3,
                private: 1,
                total: 4
            }
        );

        assert_eq!(repo.mark_all_read(ram).await.unwrap(), 3);
        assert_eq!(repo.mark_all_private_read(ram).await.unwrap(), 1);
        assert_eq!(repo.unread_counts(ram).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn delete_requires_ownership() {
        let (db, ram, sita) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        push(&mut conn, ram, Some(sita), NotificationKind::Answer, "a", None)
            .await
            .unwrap();
        push(&mut conn, ram, Some(sita), NotificationKind::Answer, "b", None)
            .await
            .unwrap();
        drop(conn);

        let repo = db.notifications();
        let id = repo.list(ram, 10).await.unwrap()[0].id;
        assert!(matches!(repo.delete(sita, id).await, Err(DbError::NotFound(_))));
        repo.delete(ram, id).await.unwrap();
        assert!(matches!(repo.delete(ram, id).await, Err(DbError::NotFound(_))));
        assert_eq!(repo.delete_all(ram).await.unwrap(), 1);
        assert_eq!(repo.delete_all(ram).await.unwrap(), 0);
    }
}
