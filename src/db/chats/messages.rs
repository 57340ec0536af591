//! Messages, reactions and chat read tracking.

use super::{ALLOWED_REACTIONS, ChatKind, ChatRepository, ensure_member};
use crate::db::{DbError, Page, PageWindow, now};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Link,
}

/// Payload of a message being sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewMessage {
    Text(String),
    Image {
        path: String,
    },
    File {
        path: String,
        name: String,
    },
    Link {
        url: String,
        title: String,
        description: String,
        image: Option<String>,
    },
}

impl NewMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text(_) => MessageKind::Text,
            Self::Image { .. } => MessageKind::Image,
            Self::File { .. } => MessageKind::File,
            Self::Link { .. } => MessageKind::Link,
        }
    }

    /// Text stored in `content` and shown in chat previews.
    pub fn content(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Image { .. } => "Sent an image".to_string(),
            Self::File { name, .. } => format!("Sent a file: {name}"),
            Self::Link { url, .. } => url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ReactionSummary {
    #[serde(skip)]
    pub message_id: i64,
    pub reaction: String,
    pub count: i64,
    /// Whether the viewer is among the reactors.
    pub reacted: bool,
}

/// A message as listed in a chat. Deleted messages keep their row but lose
/// their content and attachments.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageView {
    pub id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub private_chat_id: Option<i64>,
    pub group_chat_id: Option<i64>,
    pub message_type: MessageKind,
    pub content: String,
    pub image_path: Option<String>,
    pub file_path: Option<String>,
    pub link_url: Option<String>,
    pub link_title: Option<String>,
    pub link_description: Option<String>,
    pub link_image: Option<String>,
    pub created_at: i64,
    pub edited_at: Option<i64>,
    pub is_edited: bool,
    pub is_deleted: bool,
    #[sqlx(skip)]
    pub reactions: Vec<ReactionSummary>,
}

/// Result of sending a message.
#[derive(Debug, Clone, Serialize)]
pub struct SentMessage {
    pub message: MessageView,
    /// Notification rows created for the other participants.
    pub notified: u64,
}

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.sender_id, u.username AS sender_username, m.private_chat_id, m.group_chat_id,
           m.message_type,
           CASE WHEN m.is_deleted = 1 THEN '' ELSE m.content END AS content,
           CASE WHEN m.is_deleted = 1 THEN NULL ELSE m.image_path END AS image_path,
           CASE WHEN m.is_deleted = 1 THEN NULL ELSE m.file_path END AS file_path,
           CASE WHEN m.is_deleted = 1 THEN NULL ELSE m.link_url END AS link_url,
           CASE WHEN m.is_deleted = 1 THEN NULL ELSE m.link_title END AS link_title,
           CASE WHEN m.is_deleted = 1 THEN NULL ELSE m.link_description END AS link_description,
           CASE WHEN m.is_deleted = 1 THEN NULL ELSE m.link_image END AS link_image,
           m.created_at, m.edited_at, m.is_edited, m.is_deleted
    FROM messages m JOIN users u ON u.id = m.sender_id
"#;

/// Stored owner and location of a message.
#[derive(sqlx::FromRow)]
struct MessageRef {
    sender_id: i64,
    private_chat_id: Option<i64>,
    group_chat_id: Option<i64>,
    message_type: MessageKind,
    is_deleted: bool,
}

impl MessageRef {
    fn chat(&self) -> Option<(ChatKind, i64)> {
        match (self.private_chat_id, self.group_chat_id) {
            (Some(id), _) => Some((ChatKind::Private, id)),
            (None, Some(id)) => Some((ChatKind::Group, id)),
            (None, None) => None,
        }
    }
}

impl<'a> ChatRepository<'a> {
    /// Store a message and fan out one unread notification per other participant.
    pub async fn send(
        &self,
        sender_id: i64,
        kind: ChatKind,
        chat_id: i64,
        message: NewMessage,
    ) -> Result<SentMessage, DbError> {
        let content = message.content();
        if content.is_empty() {
            return Err(DbError::invalid("Message cannot be empty."));
        }

        let (image_path, file_path, link) = match &message {
            NewMessage::Text(_) => (None, None, None),
            NewMessage::Image { path } => (Some(path.as_str()), None, None),
            NewMessage::File { path, .. } => (None, Some(path.as_str()), None),
            NewMessage::Link {
                url,
                title,
                description,
                image,
            } => (None, None, Some((url, title, description, image))),
        };

        let created_at = now();
        let mut tx = self.pool.begin().await?;
        ensure_member(&mut tx, kind, chat_id, sender_id).await?;

        let column = kind.message_column();
        let id = sqlx::query(&format!(
            r#"
            INSERT INTO messages (sender_id, {column}, message_type, content, image_path, file_path,
                                  link_url, link_title, link_description, link_image, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        ))
        .bind(sender_id)
        .bind(chat_id)
        .bind(message.kind())
        .bind(&content)
        .bind(image_path)
        .bind(file_path)
        .bind(link.map(|(url, ..)| url.as_str()))
        .bind(link.map(|(_, title, ..)| title.as_str()))
        .bind(link.map(|(_, _, description, _)| description.as_str()))
        .bind(link.and_then(|(.., image)| image.as_deref()))
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let recipients_sql = match kind {
            ChatKind::Private => {
                "SELECT user_id FROM private_chat_participants WHERE chat_id = ? AND user_id <> ?"
            }
            ChatKind::Group => {
                "SELECT user_id FROM group_chat_members WHERE chat_id = ? AND user_id <> ?"
            }
        };
        let notified = sqlx::query(&format!(
            r#"
            INSERT OR IGNORE INTO chat_notifications (user_id, message_id, created_at)
            SELECT user_id, ?, ? FROM ({recipients_sql})
            "#
        ))
        .bind(id)
        .bind(created_at)
        .bind(chat_id)
        .bind(sender_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let chat_table = match kind {
            ChatKind::Private => "private_chats",
            ChatKind::Group => "group_chats",
        };
        sqlx::query(&format!("UPDATE {chat_table} SET updated_at = ? WHERE id = ?"))
            .bind(created_at)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            message_id = id,
            chat_id,
            chat_kind = kind.as_str(),
            notified,
            "Message sent"
        );

        Ok(SentMessage {
            message: self.message(id, sender_id).await?,
            notified,
        })
    }

    /// Load one message with its reactions as seen by `viewer_id`.
    pub async fn message(&self, id: i64, viewer_id: i64) -> Result<MessageView, DbError> {
        let mut message = sqlx::query_as::<_, MessageView>(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Message"))?;
        self.attach_reactions(std::slice::from_mut(&mut message), viewer_id)
            .await?;
        Ok(message)
    }

    /// One page of a chat, oldest first.
    pub async fn messages(
        &self,
        viewer_id: i64,
        kind: ChatKind,
        chat_id: i64,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<Page<MessageView>, DbError> {
        let mut conn = self.pool.acquire().await?;
        ensure_member(&mut conn, kind, chat_id, viewer_id).await?;
        drop(conn);

        let column = kind.message_column();
        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM messages WHERE {column} = ?"))
                .bind(chat_id)
                .fetch_one(self.pool)
                .await?;
        let window = PageWindow::new(page, per_page, total);

        let mut items = sqlx::query_as::<_, MessageView>(&format!(
            "{MESSAGE_SELECT} WHERE m.{column} = ? ORDER BY m.created_at, m.id LIMIT ? OFFSET ?"
        ))
        .bind(chat_id)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;
        self.attach_reactions(&mut items, viewer_id).await?;

        Ok(window.into_page(items))
    }

    async fn attach_reactions(
        &self,
        messages: &mut [MessageView],
        viewer_id: i64,
    ) -> Result<(), DbError> {
        if messages.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        let ids_json = serde_json::to_string(&ids).map_err(|e| DbError::Internal(e.to_string()))?;

        let rows = sqlx::query_as::<_, ReactionSummary>(
            r#"
            SELECT message_id, reaction, COUNT(*) AS count,
                   MAX(user_id = ?) AS reacted
            FROM message_reactions
            WHERE message_id IN (SELECT value FROM json_each(?))
            GROUP BY message_id, reaction
            ORDER BY message_id, MIN(created_at), reaction
            "#,
        )
        .bind(viewer_id)
        .bind(ids_json)
        .fetch_all(self.pool)
        .await?;

        for row in rows {
            if let Some(message) = messages.iter_mut().find(|m| m.id == row.message_id) {
                message.reactions.push(row);
            }
        }
        Ok(())
    }

    async fn message_ref(&self, id: i64) -> Result<MessageRef, DbError> {
        sqlx::query_as::<_, MessageRef>(
            "SELECT sender_id, private_chat_id, group_chat_id, message_type, is_deleted FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Message"))
    }

    /// Replace the text of one's own text message.
    pub async fn edit_message(
        &self,
        user_id: i64,
        id: i64,
        content: &str,
    ) -> Result<MessageView, DbError> {
        let found = self.message_ref(id).await?;
        if found.is_deleted {
            return Err(DbError::not_found("Message"));
        }
        if found.sender_id != user_id {
            return Err(DbError::denied("You can only edit your own messages."));
        }
        if found.message_type != MessageKind::Text {
            return Err(DbError::invalid("Only text messages can be edited."));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(DbError::invalid("Message cannot be empty."));
        }

        sqlx::query("UPDATE messages SET content = ?, is_edited = 1, edited_at = ? WHERE id = ?")
            .bind(content)
            .bind(now())
            .bind(id)
            .execute(self.pool)
            .await?;
        self.message(id, user_id).await
    }

    /// Soft-delete one's own message.
    pub async fn delete_message(&self, user_id: i64, id: i64) -> Result<(), DbError> {
        let found = self.message_ref(id).await?;
        if found.is_deleted {
            return Err(DbError::not_found("Message"));
        }
        if found.sender_id != user_id {
            return Err(DbError::denied("You can only delete your own messages."));
        }
        sqlx::query("UPDATE messages SET is_deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Toggle a reaction. Returns `true` when the reaction was added.
    pub async fn react(&self, user_id: i64, message_id: i64, reaction: &str) -> Result<bool, DbError> {
        if !ALLOWED_REACTIONS.contains(&reaction) {
            return Err(DbError::invalid(format!("Unsupported reaction: {reaction}")));
        }
        let found = self.message_ref(message_id).await?;
        let (kind, chat_id) = found
            .chat()
            .ok_or_else(|| DbError::Internal(format!("message {message_id} has no chat")))?;

        let mut tx = self.pool.begin().await?;
        ensure_member(&mut tx, kind, chat_id, user_id).await?;

        let removed = sqlx::query(
            "DELETE FROM message_reactions WHERE message_id = ? AND user_id = ? AND reaction = ?",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(reaction)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            sqlx::query(
                "INSERT INTO message_reactions (message_id, user_id, reaction, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(message_id)
            .bind(user_id)
            .bind(reaction)
            .bind(now())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(removed == 0)
    }

    /// Mark every notification of a chat read for one user.
    pub async fn mark_read(&self, user_id: i64, kind: ChatKind, chat_id: i64) -> Result<u64, DbError> {
        let column = kind.message_column();
        let result = sqlx::query(&format!(
            r#"
            UPDATE chat_notifications SET is_read = 1
            WHERE user_id = ? AND is_read = 0
              AND message_id IN (SELECT id FROM messages WHERE {column} = ?)
            "#
        ))
        .bind(user_id)
        .bind(chat_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Unread chat notifications across every chat.
    pub async fn unread_total(&self, user_id: i64) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::user;
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn sending_fans_out_to_other_participants() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let hari = user(&db, "hari").await;
        let chats = db.chats();
        let group = chats
            .create_group(ram.id, "Trio", None, &[sita.id, hari.id])
            .await
            .unwrap();

        let sent = chats
            .send(ram.id, ChatKind::Group, group.id, NewMessage::Text(" hello ".into()))
            .await
            .unwrap();
        assert_eq!(sent.notified, 2);
        assert_eq!(sent.message.content, "hello");
        assert_eq!(chats.unread_total(sita.id).await.unwrap(), 1);
        assert_eq!(chats.unread_total(ram.id).await.unwrap(), 0);

        chats.open_group(sita.id, group.id).await.unwrap();
        assert_eq!(chats.unread_total(sita.id).await.unwrap(), 0);
        assert_eq!(chats.unread_total(hari.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn non_members_cannot_send() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let hari = user(&db, "hari").await;
        let chats = db.chats();
        let chat = chats.open_private(ram.id, sita.id).await.unwrap();

        assert!(matches!(
            chats
                .send(hari.id, ChatKind::Private, chat.id, NewMessage::Text("hi".into()))
                .await,
            Err(DbError::InsufficientAccess(_))
        ));
        assert!(matches!(
            chats
                .send(ram.id, ChatKind::Private, 999, NewMessage::Text("hi".into()))
                .await,
            Err(DbError::NotFound(_))
        ));
        assert!(matches!(
            chats
                .send(ram.id, ChatKind::Private, chat.id, NewMessage::Text("   ".into()))
                .await,
            Err(DbError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn attachment_messages_get_placeholder_content() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let chats = db.chats();
        let chat = chats.open_private(ram.id, sita.id).await.unwrap();

        let image = chats
            .send(
                ram.id,
                ChatKind::Private,
                chat.id,
                NewMessage::Image {
                    path: "chat_images/a.png".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(image.message.content, "Sent an image");
        assert_eq!(image.message.message_type, MessageKind::Image);

        let file = chats
            .send(
                ram.id,
                ChatKind::Private,
                chat.id,
                NewMessage::File {
                    path: "chat_files/x.pdf".into(),
                    name: "notes.pdf".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(file.message.content, "Sent a file: notes.pdf");

        let link = chats
            .send(
                ram.id,
                ChatKind::Private,
                chat.id,
                NewMessage::Link {
                    url: "https://example.org".into(),
                    title: "Example".into(),
                    description: String::new(),
                    image: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(link.message.content, "https://example.org");
        assert_eq!(link.message.link_title.as_deref(), Some("Example"));
    }

    #[tokio::test]
    async fn edit_and_delete_own_messages_only() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let chats = db.chats();
        let chat = chats.open_private(ram.id, sita.id).await.unwrap();
        let sent = chats
            .send(ram.id, ChatKind::Private, chat.id, NewMessage::Text("helo".into()))
            .await
            .unwrap();
        let id = sent.message.id;

        assert!(chats.edit_message(sita.id, id, "hijack").await.is_err());
        let edited = chats.edit_message(ram.id, id, "hello").await.unwrap();
        assert!(edited.is_edited);
        assert!(edited.edited_at.is_some());
        assert_eq!(edited.content, "hello");

        assert!(chats.delete_message(sita.id, id).await.is_err());
        chats.delete_message(ram.id, id).await.unwrap();
        let page = chats
            .messages(sita.id, ChatKind::Private, chat.id, None, 50)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].is_deleted);
        assert_eq!(page.items[0].content, "");
        assert!(chats.edit_message(ram.id, id, "again").await.is_err());
    }

    #[tokio::test]
    async fn reactions_toggle_and_are_restricted() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let hari = user(&db, "hari").await;
        let chats = db.chats();
        let chat = chats.open_private(ram.id, sita.id).await.unwrap();
        let sent = chats
            .send(ram.id, ChatKind::Private, chat.id, NewMessage::Text("react".into()))
            .await
            .unwrap();
        let id = sent.message.id;

        assert!(chats.react(sita.id, id, "🔥").await.unwrap());
        assert!(chats.react(ram.id, id, "🔥").await.unwrap());
        let seen = chats.message(id, sita.id).await.unwrap();
        assert_eq!(seen.reactions.len(), 1);
        assert_eq!(seen.reactions[0].count, 2);
        assert!(seen.reactions[0].reacted);

        assert!(!chats.react(sita.id, id, "🔥").await.unwrap());
        let seen = chats.message(id, sita.id).await.unwrap();
        assert_eq!(seen.reactions[0].count, 1);
        assert!(!seen.reactions[0].reacted);

        assert!(matches!(
            chats.react(sita.id, id, "💩").await,
            Err(DbError::Invalid(_))
        ));
        assert!(matches!(
            chats.react(hari.id, id, "👍").await,
            Err(DbError::InsufficientAccess(_))
        ));
    }

    #[tokio::test]
    async fn messages_paginate_oldest_first() {
        let db = Database::new(":memory:").await.unwrap();
        let ram = user(&db, "ram").await;
        let sita = user(&db, "sita").await;
        let chats = db.chats();
        let chat = chats.open_private(ram.id, sita.id).await.unwrap();
        for i in 0..5 {
            chats
                .send(ram.id, ChatKind::Private, chat.id, NewMessage::Text(format!("m{i}")))
                .await
                .unwrap();
        }

        let first = chats
            .messages(ram.id, ChatKind::Private, chat.id, Some(1), 2)
            .await
            .unwrap();
        assert_eq!(first.num_pages, 3);
        assert_eq!(first.items[0].content, "m0");
        let last = chats
            .messages(ram.id, ChatKind::Private, chat.id, Some(99), 2)
            .await
            .unwrap();
        assert_eq!(last.page, 3);
        assert_eq!(last.items[0].content, "m4");
    }
}
