//! Chat list and suggested conversation partners.

use super::{ChatKind, ChatRepository};
use crate::db::accounts::{SUMMARY_COLUMNS, UserType};
use crate::db::{DbError, now};
use serde::Serialize;
use std::collections::HashSet;

/// One row of the chat list.
#[derive(Debug, Clone, Serialize)]
pub struct ChatListEntry {
    pub kind: ChatKind,
    pub id: i64,
    /// The other participant, for private chats.
    pub user_id: Option<i64>,
    pub name: String,
    pub photo: Option<String>,
    pub latest_message: String,
    pub latest_message_time: Option<i64>,
    pub unread_count: i64,
}

/// A user the viewer might want to start a conversation with.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestedUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub photo: Option<String>,
    pub user_type: UserType,
    pub is_very_active: bool,
    pub has_mutual_interaction: bool,
    pub last_seen: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: i64,
    user_id: Option<i64>,
    name: String,
    photo: Option<String>,
    latest_message: Option<String>,
    latest_message_time: Option<i64>,
    unread_count: i64,
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: i64,
    username: String,
    full_name: String,
    profile_photo: Option<String>,
    user_type: UserType,
    last_login: Option<i64>,
}

const NO_MESSAGES: &str = "No messages yet";

/// Latest message preview, time and unread count for the chat aliased `c`.
fn latest_columns(kind: ChatKind) -> String {
    let column = kind.message_column();
    format!(
        r#"
        (SELECT CASE WHEN m.is_deleted = 1 THEN 'This message was deleted' ELSE m.content END
         FROM messages m WHERE m.{column} = c.id
         ORDER BY m.created_at DESC, m.id DESC LIMIT 1) AS latest_message,
        (SELECT MAX(m.created_at) FROM messages m WHERE m.{column} = c.id) AS latest_message_time,
        (SELECT COUNT(*) FROM chat_notifications n JOIN messages m ON m.id = n.message_id
         WHERE n.user_id = ?1 AND n.is_read = 0 AND m.{column} = c.id) AS unread_count
        "#
    )
}

/// Candidates must not be the viewer, a superuser, inactive, or an
/// existing private-chat partner.
const CANDIDATE_FILTER: &str = r#"
    u.id <> ?1 AND u.is_superuser = 0 AND u.is_active = 1
    AND u.id NOT IN (
        SELECT other.user_id FROM private_chat_participants me
        JOIN private_chat_participants other ON other.chat_id = me.chat_id
        WHERE me.user_id = ?1
    )
"#;

const RECENT_FIRST: &str = "ORDER BY u.last_login IS NULL, u.last_login DESC, u.id";

impl<'a> ChatRepository<'a> {
    /// Private and group chats of a user, most recent activity first.
    ///
    /// Chats without messages sort as if their last activity were now.
    pub async fn chat_list(&self, user_id: i64) -> Result<Vec<ChatListEntry>, DbError> {
        let private = sqlx::query_as::<_, ChatRow>(&format!(
            r#"
            SELECT c.id, u.id AS user_id,
                   CASE WHEN p.full_name <> '' THEN p.full_name ELSE u.username END AS name,
                   p.profile_photo AS photo,
                   {}
            FROM private_chats c
            JOIN private_chat_participants me ON me.chat_id = c.id AND me.user_id = ?1
            JOIN private_chat_participants other ON other.chat_id = c.id AND other.user_id <> ?1
            JOIN users u ON u.id = other.user_id
            JOIN profiles p ON p.user_id = u.id
            "#,
            latest_columns(ChatKind::Private)
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        let groups = sqlx::query_as::<_, ChatRow>(&format!(
            r#"
            SELECT c.id, NULL AS user_id, c.name, c.profile_photo AS photo,
                   {}
            FROM group_chats c
            JOIN group_chat_members me ON me.chat_id = c.id AND me.user_id = ?1
            "#,
            latest_columns(ChatKind::Group)
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        let entry = |kind: ChatKind, row: ChatRow| ChatListEntry {
            kind,
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            photo: row.photo,
            latest_message: row.latest_message.unwrap_or_else(|| NO_MESSAGES.to_string()),
            latest_message_time: row.latest_message_time,
            unread_count: row.unread_count,
        };

        let mut chats: Vec<ChatListEntry> = private
            .into_iter()
            .map(|row| entry(ChatKind::Private, row))
            .chain(groups.into_iter().map(|row| entry(ChatKind::Group, row)))
            .collect();

        let now = now();
        chats.sort_by_key(|c| {
            std::cmp::Reverse((
                c.latest_message_time.unwrap_or(now),
                c.latest_message_time.is_none(),
            ))
        });
        Ok(chats)
    }

    async fn candidate_ids(
        &self,
        sql: &str,
        user_id: i64,
        extra: &[i64],
    ) -> Result<Vec<(i64, Option<i64>)>, DbError> {
        let mut query = sqlx::query_as::<_, (i64, Option<i64>)>(sql).bind(user_id);
        for value in extra {
            query = query.bind(*value);
        }
        Ok(query.fetch_all(self.pool).await?)
    }

    /// Suggest up to `limit` people to message.
    ///
    /// Priority: users with mutual Q&A interactions (recently active ones
    /// first), then users active within 24h, then 48h, then everyone else by
    /// last login.
    pub async fn suggested_users(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<SuggestedUser>, DbError> {
        let limit = limit.max(0) as usize;
        let now = now();
        let day_ago = now - 86_400;
        let two_days_ago = now - 2 * 86_400;

        let mutual = self
            .candidate_ids(
                &format!(
                    r#"
                    SELECT u.id, u.last_login FROM users u
                    WHERE {CANDIDATE_FILTER} AND u.id IN (
                        SELECT c.author_id FROM comments c
                        JOIN questions q ON q.id = c.question_id
                        WHERE q.owner_id = ?1 AND q.is_deleted = 0
                        UNION
                        SELECT v.user_id FROM question_votes v
                        JOIN questions q ON q.id = v.question_id
                        WHERE q.owner_id = ?1 AND q.is_deleted = 0 AND v.direction = 1
                        UNION
                        SELECT q.owner_id FROM comments c
                        JOIN questions q ON q.id = c.question_id
                        WHERE c.author_id = ?1
                        UNION
                        SELECT a.owner_id FROM comments c
                        JOIN answers a ON a.id = c.answer_id
                        WHERE c.author_id = ?1
                    )
                    {RECENT_FIRST}
                    "#
                ),
                user_id,
                &[],
            )
            .await?;

        let active_since = format!(
            r#"
            SELECT u.id, u.last_login FROM users u
            WHERE {CANDIDATE_FILTER} AND (
                u.last_login >= ?2
                OR EXISTS(SELECT 1 FROM questions q WHERE q.owner_id = u.id AND q.created_at >= ?2)
                OR EXISTS(SELECT 1 FROM answers a WHERE a.owner_id = u.id AND a.created_at >= ?2)
            )
            {RECENT_FIRST}
            LIMIT ?3
            "#
        );
        let active_24h = self
            .candidate_ids(&active_since, user_id, &[day_ago, limit as i64])
            .await?;
        let active_48h = self
            .candidate_ids(&active_since, user_id, &[two_days_ago, limit as i64])
            .await?;
        let others = self
            .candidate_ids(
                &format!(
                    "SELECT u.id, u.last_login FROM users u WHERE {CANDIDATE_FILTER} {RECENT_FIRST} LIMIT ?2"
                ),
                user_id,
                &[2 * limit as i64],
            )
            .await?;

        let mut picked: Vec<i64> = Vec::new();
        let mut push = |id: i64, cap: usize| {
            if !picked.contains(&id) && picked.len() < cap {
                picked.push(id);
            }
        };
        for (id, _) in mutual
            .iter()
            .filter(|(_, last)| last.is_some_and(|t| t >= day_ago))
            .take(3)
        {
            push(*id, limit);
        }
        for (id, _) in mutual.iter().take(5) {
            push(*id, limit);
        }
        for (id, _) in active_24h.iter().chain(&active_48h).chain(&others) {
            push(*id, limit);
        }

        if picked.is_empty() {
            return Ok(Vec::new());
        }

        let mutual_ids: HashSet<i64> = mutual.iter().map(|(id, _)| *id).collect();
        let ids_json = serde_json::to_string(&picked).map_err(|e| DbError::Internal(e.to_string()))?;
        let rows = sqlx::query_as::<_, CandidateRow>(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS}, u.last_login
            FROM users u JOIN profiles p ON p.user_id = u.id
            WHERE u.id IN (SELECT value FROM json_each(?))
            "#
        ))
        .bind(ids_json)
        .fetch_all(self.pool)
        .await?;

        let mut suggestions: Vec<SuggestedUser> = rows
            .into_iter()
            .map(|row| SuggestedUser {
                id: row.id,
                is_very_active: row.last_login.is_some_and(|t| t >= day_ago),
                has_mutual_interaction: mutual_ids.contains(&row.id),
                username: row.username,
                full_name: row.full_name,
                photo: row.profile_photo,
                user_type: row.user_type,
                last_seen: row.last_login,
            })
            .collect();
        suggestions.sort_by_key(|s| picked.iter().position(|id| *id == s.id));
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::super::NewMessage;
    use super::super::test_support::user;
    use super::*;
    use crate::db::{CommentTarget, Database};

    #[tokio::test]
    async fn chat_list_orders_by_latest_message_and_counts_unread() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let hari = user(&db, "hari").await;
        let chats = db.chats();

        let private = chats.open_private(ram.id, sita.id).await.unwrap();
        let group = chats.create_group(hari.id, "Club", None, &[ram.id]).await.unwrap();
        chats
            .send(sita.id, ChatKind::Private, private.id, NewMessage::Text("one".into()))
            .await
            .unwrap();
        chats
            .send(sita.id, ChatKind::Private, private.id, NewMessage::Text("two".into()))
            .await
            .unwrap();

        let list = chats.chat_list(ram.id).await.unwrap();
        assert_eq!(list.len(), 2);
        // The group has no messages, so it sorts as "now", ahead of the private chat.
        assert_eq!(list[0].kind, ChatKind::Group);
        assert_eq!(list[0].id, group.id);
        assert_eq!(list[0].latest_message, NO_MESSAGES);

        let private_entry = &list[1];
        assert_eq!(private_entry.user_id, Some(sita.id));
        assert_eq!(private_entry.name, "sita");
        assert_eq!(private_entry.latest_message, "two");
        assert_eq!(private_entry.unread_count, 2);
    }

    #[tokio::test]
    async fn suggestions_prefer_mutual_interactions_and_skip_partners() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let hari = user(&db, "hari").await;
        let gita = user(&db, "gita").await;
        let chats = db.chats();
        let qa = db.qa();

        let q = qa
            .ask(ram.id, "Looking for help", "Anyone around campus?", &["help"])
            .await
            .unwrap();
        qa.comment(gita.id, CommentTarget::Question(q.id), "me!")
            .await
            .unwrap();
        chats.open_private(ram.id, hari.id).await.unwrap();

        let suggested = chats.suggested_users(ram.id, 10).await.unwrap();
        let ids: Vec<i64> = suggested.iter().map(|s| s.id).collect();
        assert_eq!(ids[0], gita.id);
        assert!(suggested[0].has_mutual_interaction);
        assert!(ids.contains(&sita.id));
        assert!(!ids.contains(&hari.id));
        assert!(!ids.contains(&ram.id));

        assert_eq!(chats.suggested_users(ram.id, 1).await.unwrap().len(), 1);
    }
}
