//! Chat repository.
//!
//! - this module: chat types, private chats and group chat membership
//! - [`messages`]: sending, editing, reactions and read tracking
//! - [`listing`]: the chat list and suggested conversation partners
//!
//! Private chats are created lazily the first time one user opens a
//! conversation with another. Every message fans out one unread
//! `chat_notifications` row per other participant in the same transaction.

mod listing;
mod messages;

pub use messages::NewMessage;

use super::accounts::{SUMMARY_COLUMNS, UserSummary};
use super::{DbError, now};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

/// Reactions a message may carry.
pub const ALLOWED_REACTIONS: [&str; 6] = ["👍", "❤️", "😂", "😮", "😢", "🔥"];

/// Which kind of conversation a chat id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }

    /// Column on `messages` referencing this kind of chat.
    fn message_column(self) -> &'static str {
        match self {
            Self::Private => "private_chat_id",
            Self::Group => "group_chat_id",
        }
    }
}

/// A one-to-one conversation seen from one participant.
#[derive(Debug, Clone, Serialize)]
pub struct PrivateChat {
    pub id: i64,
    pub other_user: UserSummary,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GroupChat {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub profile_photo: Option<String>,
    pub creator_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[sqlx(skip)]
    pub members: Vec<UserSummary>,
}

/// Fails unless `user_id` takes part in the chat.
pub(crate) async fn ensure_member(
    conn: &mut SqliteConnection,
    kind: ChatKind,
    chat_id: i64,
    user_id: i64,
) -> Result<(), DbError> {
    let (exists_sql, member_sql, what) = match kind {
        ChatKind::Private => (
            "SELECT EXISTS(SELECT 1 FROM private_chats WHERE id = ?)",
            "SELECT EXISTS(SELECT 1 FROM private_chat_participants WHERE chat_id = ? AND user_id = ?)",
            "Chat",
        ),
        ChatKind::Group => (
            "SELECT EXISTS(SELECT 1 FROM group_chats WHERE id = ?)",
            "SELECT EXISTS(SELECT 1 FROM group_chat_members WHERE chat_id = ? AND user_id = ?)",
            "Group chat",
        ),
    };

    let exists: bool = sqlx::query_scalar(exists_sql)
        .bind(chat_id)
        .fetch_one(&mut *conn)
        .await?;
    if !exists {
        return Err(DbError::not_found(what));
    }

    let member: bool = sqlx::query_scalar(member_sql)
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    if !member {
        return Err(DbError::denied("Unauthorized"));
    }
    Ok(())
}

/// Repository for chats and messages.
pub struct ChatRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChatRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    async fn user_summary(&self, user_id: i64) -> Result<UserSummary, DbError> {
        sqlx::query_as::<_, UserSummary>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM users u JOIN profiles p ON p.user_id = u.id WHERE u.id = ?"
        ))
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("User"))
    }

    /// Fails unless `user_id` takes part in the chat.
    pub async fn ensure_participant(
        &self,
        user_id: i64,
        kind: ChatKind,
        chat_id: i64,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        ensure_member(&mut conn, kind, chat_id, user_id).await
    }

    /// Fails unless `user_id` created the group.
    pub async fn ensure_group_creator(&self, user_id: i64, group_id: i64) -> Result<(), DbError> {
        let creator_id: i64 = sqlx::query_scalar("SELECT creator_id FROM group_chats WHERE id = ?")
            .bind(group_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Group chat"))?;
        if creator_id != user_id {
            return Err(DbError::denied("Only group creator can update group info"));
        }
        Ok(())
    }

    /// Open (creating on first use) the private chat with another user and
    /// mark its notifications read for the opener.
    ///
    /// The chat row is keyed by the ordered user pair, so concurrent first
    /// opens converge on one chat.
    pub async fn open_private(&self, user_id: i64, other_id: i64) -> Result<PrivateChat, DbError> {
        let other_user = self.user_summary(other_id).await?;
        if user_id == other_id {
            return Err(DbError::invalid("You cannot chat with yourself."));
        }
        let (low, high) = (user_id.min(other_id), user_id.max(other_id));

        let created_at = now();
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO private_chats (user_low, user_high, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_low, user_high) DO NOTHING
            "#,
        )
        .bind(low)
        .bind(high)
        .bind(created_at)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        let (id, created_at) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT id, created_at FROM private_chats WHERE user_low = ? AND user_high = ?",
        )
        .bind(low)
        .bind(high)
        .fetch_one(&mut *tx)
        .await?;

        if inserted.rows_affected() == 1 {
            for participant in [low, high] {
                sqlx::query("INSERT INTO private_chat_participants (chat_id, user_id) VALUES (?, ?)")
                    .bind(id)
                    .bind(participant)
                    .execute(&mut *tx)
                    .await?;
            }
            tracing::debug!(chat_id = id, user_id, other_id, "Private chat created");
        }
        tx.commit().await?;

        self.mark_read(user_id, ChatKind::Private, id).await?;
        Ok(PrivateChat {
            id,
            other_user,
            created_at,
        })
    }

    /// Create a group chat. Unknown member ids are skipped; the creator is always a member.
    pub async fn create_group(
        &self,
        creator_id: i64,
        name: &str,
        description: Option<&str>,
        member_ids: &[i64],
    ) -> Result<GroupChat, DbError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::invalid("Group name is required"));
        }
        if member_ids.is_empty() {
            return Err(DbError::invalid("At least one member is required"));
        }

        let created_at = now();
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO group_chats (name, description, creator_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(description.map(str::trim).filter(|d| !d.is_empty()))
        .bind(creator_id)
        .bind(created_at)
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for member in std::iter::once(&creator_id).chain(member_ids) {
            sqlx::query(
                "INSERT OR IGNORE INTO group_chat_members (chat_id, user_id) SELECT ?, id FROM users WHERE id = ?",
            )
            .bind(id)
            .bind(*member)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(group_id = id, creator_id, "Group chat created");
        self.group(id).await
    }

    /// Load a group chat with its members.
    pub async fn group(&self, group_id: i64) -> Result<GroupChat, DbError> {
        let mut group = sqlx::query_as::<_, GroupChat>(
            r#"
            SELECT id, name, description, profile_photo, creator_id, created_at, updated_at
            FROM group_chats WHERE id = ?
            "#,
        )
        .bind(group_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Group chat"))?;

        group.members = sqlx::query_as::<_, UserSummary>(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS}
            FROM group_chat_members m
            JOIN users u ON u.id = m.user_id
            JOIN profiles p ON p.user_id = u.id
            WHERE m.chat_id = ?
            ORDER BY u.username
            "#
        ))
        .bind(group_id)
        .fetch_all(self.pool)
        .await?;
        Ok(group)
    }

    /// Open a group chat as a member, marking its notifications read.
    pub async fn open_group(&self, user_id: i64, group_id: i64) -> Result<GroupChat, DbError> {
        let group = self.group(group_id).await?;
        if !group.members.iter().any(|m| m.id == user_id) {
            return Err(DbError::denied("You are not a member of this group."));
        }
        self.mark_read(user_id, ChatKind::Group, group_id).await?;
        Ok(group)
    }

    /// Add a user to a group. Allowed for the creator and any member.
    pub async fn add_member(
        &self,
        actor_id: i64,
        group_id: i64,
        user_id: i64,
    ) -> Result<UserSummary, DbError> {
        let group = self.group(group_id).await?;
        if group.creator_id != actor_id && !group.members.iter().any(|m| m.id == actor_id) {
            return Err(DbError::denied("Unauthorized"));
        }
        let user = self.user_summary(user_id).await?;

        sqlx::query("INSERT OR IGNORE INTO group_chat_members (chat_id, user_id) VALUES (?, ?)")
            .bind(group_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(user)
    }

    /// Remove a member from a group (creator only; the creator stays).
    pub async fn remove_member(
        &self,
        actor_id: i64,
        group_id: i64,
        user_id: i64,
    ) -> Result<UserSummary, DbError> {
        let group = self.group(group_id).await?;
        if group.creator_id != actor_id {
            return Err(DbError::denied("Only group creator can remove members"));
        }
        let user = self.user_summary(user_id).await?;
        if user.id == group.creator_id {
            return Err(DbError::invalid("Cannot remove group creator"));
        }

        sqlx::query("DELETE FROM group_chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(user)
    }

    /// Rename a group and/or replace its photo (creator only).
    ///
    /// Blank names leave the current name in place.
    pub async fn update_group(
        &self,
        actor_id: i64,
        group_id: i64,
        name: Option<&str>,
        photo: Option<&str>,
    ) -> Result<GroupChat, DbError> {
        self.ensure_group_creator(actor_id, group_id).await?;

        sqlx::query(
            r#"
            UPDATE group_chats SET
                name = COALESCE(?, name),
                profile_photo = COALESCE(?, profile_photo),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name.map(str::trim).filter(|n| !n.is_empty()))
        .bind(photo)
        .bind(now())
        .bind(group_id)
        .execute(self.pool)
        .await?;

        self.group(group_id).await
    }
}
