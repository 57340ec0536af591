//! Joining, leaving, join requests and member administration.

use super::{
    Community, CommunityMember, CommunityRepository, MEMBER_SELECT, MemberRole, active_role,
};
use crate::db::notifications::{NotificationKind, push};
use crate::db::{DbError, Page, PageWindow, now};
use serde::Serialize;
use sqlx::SqliteConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JoinStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JoinRequest {
    pub id: i64,
    pub community_id: i64,
    pub user_id: i64,
    pub username: String,
    pub status: JoinStatus,
    pub message: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub reviewed_by: Option<i64>,
}

/// What a join attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Joined,
    Requested,
}

/// The member directory of one community.
#[derive(Debug, Clone, Serialize)]
pub struct MembersPage {
    pub community: Community,
    pub members: Page<CommunityMember>,
    pub is_admin_or_creator: bool,
}

const REQUEST_SELECT: &str = r#"
    SELECT r.id, r.community_id, r.user_id, u.username, r.status, r.message, r.created_at,
           r.updated_at, r.reviewed_by
    FROM community_join_requests r JOIN users u ON u.id = r.user_id
"#;

/// Recompute `member_count` from the active rows.
async fn recount(conn: &mut SqliteConnection, community_id: i64) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM community_members WHERE community_id = ? AND is_active = 1",
    )
    .bind(community_id)
    .fetch_one(&mut *conn)
    .await?;
    sqlx::query("UPDATE communities SET member_count = ?, updated_at = ? WHERE id = ?")
        .bind(count)
        .bind(now())
        .bind(community_id)
        .execute(&mut *conn)
        .await?;
    Ok(count)
}

async fn active_admins(conn: &mut SqliteConnection, community_id: i64) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM community_members WHERE community_id = ? AND role = 'admin' AND is_active = 1",
    )
    .bind(community_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Create or reactivate a membership. Reactivation keeps the previous role.
async fn activate_member(
    conn: &mut SqliteConnection,
    community_id: i64,
    user_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO community_members (community_id, user_id, role, joined_at, is_active)
        VALUES (?, ?, 'member', ?, 1)
        ON CONFLICT (community_id, user_id) DO UPDATE SET is_active = 1
        "#,
    )
    .bind(community_id)
    .bind(user_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn members_link(slug: &str) -> String {
    format!("/communities/{slug}/members")
}

impl<'a> CommunityRepository<'a> {
    /// Fails unless the actor administers the community.
    async fn require_admin(
        &self,
        conn: &mut SqliteConnection,
        community: &Community,
        actor_id: i64,
        reason: &str,
    ) -> Result<(), DbError> {
        if community.creator_id == actor_id
            || active_role(conn, community.id, actor_id).await? == Some(MemberRole::Admin)
        {
            return Ok(());
        }
        Err(DbError::denied(reason))
    }

    /// Join a public community, or ask to join a private one.
    pub async fn join(
        &self,
        user_id: i64,
        slug: &str,
        message: Option<&str>,
    ) -> Result<JoinOutcome, DbError> {
        let community = self.by_slug(slug).await?;
        let mut tx = self.pool.begin().await?;

        if active_role(&mut tx, community.id, user_id).await?.is_some() {
            return Err(DbError::AlreadyExists("Already a member".to_string()));
        }

        if !community.is_private {
            activate_member(&mut tx, community.id, user_id).await?;
            let count = recount(&mut tx, community.id).await?;
            tx.commit().await?;
            tracing::info!(community = %slug, user_id, member_count = count, "Member joined");
            return Ok(JoinOutcome::Joined);
        }

        let created_at = now();
        sqlx::query(
            r#"
            INSERT INTO community_join_requests (community_id, user_id, status, message, created_at, updated_at)
            VALUES (?, ?, 'pending', ?, ?, ?)
            ON CONFLICT (community_id, user_id) DO UPDATE SET
                status = 'pending', message = excluded.message,
                updated_at = excluded.updated_at, reviewed_by = NULL
            "#,
        )
        .bind(community.id)
        .bind(user_id)
        .bind(message.map(str::trim).unwrap_or_default())
        .bind(created_at)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let admins: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM community_members
            WHERE community_id = ?1 AND role = 'admin' AND is_active = 1
            UNION
            SELECT creator_id FROM communities WHERE id = ?1
            "#,
        )
        .bind(community.id)
        .fetch_all(&mut *tx)
        .await?;
        let text = format!("{username} requested to join {}", community.name);
        for admin in admins {
            push(
                &mut tx,
                admin,
                Some(user_id),
                NotificationKind::JoinRequest,
                &text,
                Some(&members_link(slug)),
            )
            .await?;
        }
        tx.commit().await?;

        tracing::info!(community = %slug, user_id, "Join request submitted");
        Ok(JoinOutcome::Requested)
    }

    pub(super) async fn pending_requests_for(
        &self,
        community_id: i64,
    ) -> Result<Vec<JoinRequest>, DbError> {
        let requests = sqlx::query_as::<_, JoinRequest>(&format!(
            "{REQUEST_SELECT} WHERE r.community_id = ? AND r.status = 'pending' \
             ORDER BY r.created_at DESC, r.id DESC"
        ))
        .bind(community_id)
        .fetch_all(self.pool)
        .await?;
        Ok(requests)
    }

    /// Pending join requests (admins and the creator only).
    pub async fn join_requests(&self, actor_id: i64, slug: &str) -> Result<Vec<JoinRequest>, DbError> {
        let community = self.by_slug(slug).await?;
        {
            let mut conn = self.pool.acquire().await?;
            self.require_admin(
                &mut conn,
                &community,
                actor_id,
                "You do not have permission to review join requests",
            )
            .await?;
        }
        self.pending_requests_for(community.id).await
    }

    /// Approve or reject a pending join request.
    pub async fn review_request(
        &self,
        actor_id: i64,
        slug: &str,
        request_id: i64,
        approve: bool,
    ) -> Result<JoinRequest, DbError> {
        let community = self.by_slug(slug).await?;
        let mut tx = self.pool.begin().await?;
        self.require_admin(
            &mut tx,
            &community,
            actor_id,
            "You do not have permission to review join requests",
        )
        .await?;

        let request = sqlx::query_as::<_, JoinRequest>(&format!(
            "{REQUEST_SELECT} WHERE r.id = ? AND r.community_id = ?"
        ))
        .bind(request_id)
        .bind(community.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Join request"))?;
        if request.status != JoinStatus::Pending {
            return Err(DbError::invalid("This request has already been reviewed."));
        }

        let (status, kind, verb) = if approve {
            (JoinStatus::Approved, NotificationKind::JoinApproved, "approved")
        } else {
            (JoinStatus::Rejected, NotificationKind::JoinRejected, "rejected")
        };
        sqlx::query(
            "UPDATE community_join_requests SET status = ?, reviewed_by = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(actor_id)
        .bind(now())
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        if approve {
            activate_member(&mut tx, community.id, request.user_id).await?;
            recount(&mut tx, community.id).await?;
        }

        push(
            &mut tx,
            request.user_id,
            Some(actor_id),
            kind,
            &format!("Your request to join {} was {verb}", community.name),
            Some(&format!("/communities/{slug}")),
        )
        .await?;

        let reviewed = sqlx::query_as::<_, JoinRequest>(&format!("{REQUEST_SELECT} WHERE r.id = ?"))
            .bind(request_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(community = %slug, request_id, approved = approve, "Join request reviewed");
        Ok(reviewed)
    }

    /// Leave a community. The last active admin cannot leave.
    pub async fn leave(&self, user_id: i64, slug: &str) -> Result<(), DbError> {
        let community = self.by_slug(slug).await?;
        let mut tx = self.pool.begin().await?;

        let role = active_role(&mut tx, community.id, user_id)
            .await?
            .ok_or_else(|| DbError::invalid("Not a member"))?;
        if role == MemberRole::Admin && active_admins(&mut tx, community.id).await? <= 1 {
            return Err(DbError::invalid("Cannot leave: you are the only admin"));
        }

        sqlx::query("UPDATE community_members SET is_active = 0 WHERE community_id = ? AND user_id = ?")
            .bind(community.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let count = recount(&mut tx, community.id).await?;
        tx.commit().await?;

        tracing::info!(community = %slug, user_id, member_count = count, "Member left");
        Ok(())
    }

    /// Active members of a community. Private communities only show their
    /// members to members and the creator.
    pub async fn members(
        &self,
        viewer_id: i64,
        slug: &str,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<MembersPage, DbError> {
        let community = self.by_slug(slug).await?;
        let viewer_role = {
            let mut conn = self.pool.acquire().await?;
            active_role(&mut conn, community.id, viewer_id).await?
        };
        let is_creator = community.creator_id == viewer_id;
        if community.is_private && viewer_role.is_none() && !is_creator {
            return Err(DbError::denied(
                "This is a private community. You need to be a member to view its members.",
            ));
        }

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM community_members WHERE community_id = ? AND is_active = 1",
        )
        .bind(community.id)
        .fetch_one(self.pool)
        .await?;
        let window = PageWindow::new(page, per_page, total);

        let items = sqlx::query_as::<_, CommunityMember>(&format!(
            "{MEMBER_SELECT} WHERE m.community_id = ? AND m.is_active = 1 \
             ORDER BY m.joined_at DESC, m.id DESC LIMIT ? OFFSET ?"
        ))
        .bind(community.id)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(MembersPage {
            is_admin_or_creator: is_creator || viewer_role == Some(MemberRole::Admin),
            members: window.into_page(items),
            community,
        })
    }

    /// Deactivate another member (admin or creator). The creator and the
    /// last admin cannot be removed.
    pub async fn remove_member(&self, actor_id: i64, slug: &str, user_id: i64) -> Result<(), DbError> {
        let community = self.by_slug(slug).await?;
        let mut tx = self.pool.begin().await?;
        self.require_admin(
            &mut tx,
            &community,
            actor_id,
            "You do not have permission to remove members",
        )
        .await?;

        if user_id == community.creator_id {
            return Err(DbError::invalid("Cannot remove the community creator"));
        }
        let role = active_role(&mut tx, community.id, user_id)
            .await?
            .ok_or_else(|| DbError::not_found("Member"))?;
        if role == MemberRole::Admin && active_admins(&mut tx, community.id).await? <= 1 {
            return Err(DbError::invalid(
                "Cannot remove the last admin. Please assign another admin first.",
            ));
        }

        sqlx::query("UPDATE community_members SET is_active = 0 WHERE community_id = ? AND user_id = ?")
            .bind(community.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let count = recount(&mut tx, community.id).await?;
        tx.commit().await?;

        tracing::info!(community = %slug, actor_id, user_id, member_count = count, "Member removed");
        Ok(())
    }

    /// Change the role of an active member (admin or creator).
    pub async fn change_role(
        &self,
        actor_id: i64,
        slug: &str,
        user_id: i64,
        role: MemberRole,
    ) -> Result<CommunityMember, DbError> {
        let community = self.by_slug(slug).await?;
        let mut tx = self.pool.begin().await?;
        self.require_admin(
            &mut tx,
            &community,
            actor_id,
            "You do not have permission to change member roles",
        )
        .await?;

        let current = active_role(&mut tx, community.id, user_id)
            .await?
            .ok_or_else(|| DbError::not_found("Member"))?;
        if current == MemberRole::Admin
            && role != MemberRole::Admin
            && active_admins(&mut tx, community.id).await? <= 1
        {
            return Err(DbError::invalid(
                "Cannot demote the last admin. Please assign another admin first.",
            ));
        }

        sqlx::query("UPDATE community_members SET role = ? WHERE community_id = ? AND user_id = ?")
            .bind(role)
            .bind(community.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let member = sqlx::query_as::<_, CommunityMember>(&format!(
            "{MEMBER_SELECT} WHERE m.community_id = ? AND m.user_id = ?"
        ))
        .bind(community.id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(community = %slug, user_id, role = role.as_str(), "Member role changed");
        Ok(member)
    }
}
