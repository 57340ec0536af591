//! Community repository.
//!
//! Communities are addressed by slug and soft-deleted through `is_active`.
//! Membership changes live in [`membership`]; every one of them recomputes
//! `member_count` from the active rows inside the same transaction.

mod membership;

pub use membership::{JoinOutcome, MembersPage};

use membership::JoinRequest;
use super::{Actor, DbError, Page, PageWindow, is_unique_violation, now};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::OnceLock;

const MIN_NAME_LEN: usize = 3;
const MIN_DESCRIPTION_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Moderator,
    Member,
}

impl MemberRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "moderator" => Some(Self::Moderator),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Community {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub icon: Option<String>,
    pub banner: Option<String>,
    pub creator_id: i64,
    pub creator_username: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub member_count: i64,
    pub is_private: bool,
}

/// Fields accepted by create and edit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunityInput {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(skip)]
    pub icon: Option<String>,
    #[serde(skip)]
    pub banner: Option<String>,
}

impl CommunityInput {
    fn validate(&self) -> Result<(&str, &str), DbError> {
        let name = self.name.trim();
        let description = self.description.trim();
        if name.chars().count() < MIN_NAME_LEN {
            return Err(DbError::invalid(format!(
                "Community name must be at least {MIN_NAME_LEN} characters long."
            )));
        }
        if description.chars().count() < MIN_DESCRIPTION_LEN {
            return Err(DbError::invalid(format!(
                "Description must be at least {MIN_DESCRIPTION_LEN} characters long."
            )));
        }
        Ok((name, description))
    }
}

/// An active membership row joined with the member's profile.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommunityMember {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub profile_photo: Option<String>,
    pub role: MemberRole,
    pub joined_at: i64,
}

/// The community page.
#[derive(Debug, Clone, Serialize)]
pub struct CommunityDetail {
    pub community: Community,
    pub is_member: bool,
    pub member_role: Option<MemberRole>,
    pub is_admin_or_creator: bool,
    pub members: Vec<CommunityMember>,
    pub member_count: i64,
    /// Pending join requests, only filled for admins and the creator.
    pub pending_requests: Vec<JoinRequest>,
}

/// The community directory.
#[derive(Debug, Clone, Serialize)]
pub struct CommunityListing {
    pub communities: Page<Community>,
    pub search_query: String,
    /// Communities the viewer is an active member of.
    pub user_communities: Vec<i64>,
}

const COMMUNITY_SELECT: &str = r#"
    SELECT c.id, c.name, c.slug, c.description, c.icon, c.banner, c.creator_id,
           u.username AS creator_username, c.created_at, c.updated_at, c.member_count,
           c.is_private
    FROM communities c JOIN users u ON u.id = c.creator_id
"#;

const MEMBER_SELECT: &str = r#"
    SELECT m.user_id, u.username, p.full_name, p.profile_photo, m.role, m.joined_at
    FROM community_members m
    JOIN users u ON u.id = m.user_id
    JOIN profiles p ON p.user_id = u.id
"#;

/// URL slug for a community name: lowercase ASCII words joined by hyphens.
pub fn slugify(name: &str) -> String {
    static PATTERNS: OnceLock<(regex::Regex, regex::Regex)> = OnceLock::new();
    let (strip, collapse) = PATTERNS.get_or_init(|| {
        (
            regex::Regex::new(r"[^\w\s-]").expect("slug strip pattern"),
            regex::Regex::new(r"[-\s]+").expect("slug collapse pattern"),
        )
    });

    let ascii: String = name
        .chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_lowercase();
    let stripped = strip.replace_all(&ascii, "");
    collapse
        .replace_all(stripped.trim(), "-")
        .trim_matches(|c| c == '-' || c == '_')
        .to_string()
}

/// Active role of a user in a community, if any.
pub(crate) async fn active_role(
    conn: &mut SqliteConnection,
    community_id: i64,
    user_id: i64,
) -> Result<Option<MemberRole>, DbError> {
    let role = sqlx::query_scalar::<_, MemberRole>(
        "SELECT role FROM community_members WHERE community_id = ? AND user_id = ? AND is_active = 1",
    )
    .bind(community_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(role)
}

/// Repository for communities and their members.
pub struct CommunityRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CommunityRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Load an active community by slug.
    pub async fn by_slug(&self, slug: &str) -> Result<Community, DbError> {
        sqlx::query_as::<_, Community>(&format!(
            "{COMMUNITY_SELECT} WHERE c.slug = ? AND c.is_active = 1"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Community"))
    }

    async fn is_admin_or_creator(&self, community: &Community, user_id: i64) -> Result<bool, DbError> {
        if community.creator_id == user_id {
            return Ok(true);
        }
        let mut conn = self.pool.acquire().await?;
        Ok(active_role(&mut conn, community.id, user_id).await? == Some(MemberRole::Admin))
    }

    /// Active communities, newest first, optionally filtered by `q` in name
    /// or description.
    pub async fn list(
        &self,
        viewer_id: i64,
        q: Option<&str>,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<CommunityListing, DbError> {
        let search_query = q.map(str::trim).unwrap_or_default().to_string();
        let pattern = format!("%{search_query}%");

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM communities c
            WHERE c.is_active = 1 AND (c.name LIKE ?1 OR c.description LIKE ?1)
            "#,
        )
        .bind(&pattern)
        .fetch_one(self.pool)
        .await?;
        let window = PageWindow::new(page, per_page, total);

        let items = sqlx::query_as::<_, Community>(&format!(
            r#"
            {COMMUNITY_SELECT}
            WHERE c.is_active = 1 AND (c.name LIKE ?1 OR c.description LIKE ?1)
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT ?2 OFFSET ?3
            "#
        ))
        .bind(&pattern)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;

        let user_communities: Vec<i64> = sqlx::query_scalar(
            "SELECT community_id FROM community_members WHERE user_id = ? AND is_active = 1",
        )
        .bind(viewer_id)
        .fetch_all(self.pool)
        .await?;

        Ok(CommunityListing {
            communities: window.into_page(items),
            search_query,
            user_communities,
        })
    }

    /// The community page for one viewer, with a preview of `preview` members.
    pub async fn detail(
        &self,
        viewer_id: i64,
        slug: &str,
        preview: i64,
    ) -> Result<CommunityDetail, DbError> {
        let community = self.by_slug(slug).await?;
        let member_role = {
            let mut conn = self.pool.acquire().await?;
            active_role(&mut conn, community.id, viewer_id).await?
        };
        let is_admin_or_creator =
            community.creator_id == viewer_id || member_role == Some(MemberRole::Admin);

        let members = sqlx::query_as::<_, CommunityMember>(&format!(
            "{MEMBER_SELECT} WHERE m.community_id = ? AND m.is_active = 1 \
             ORDER BY m.joined_at DESC, m.id DESC LIMIT ?"
        ))
        .bind(community.id)
        .bind(preview)
        .fetch_all(self.pool)
        .await?;

        let pending_requests = if is_admin_or_creator {
            self.pending_requests_for(community.id).await?
        } else {
            Vec::new()
        };

        Ok(CommunityDetail {
            is_member: member_role.is_some(),
            member_role,
            is_admin_or_creator,
            members,
            member_count: community.member_count,
            pending_requests,
            community,
        })
    }

    /// Create a community; the creator joins as its first admin.
    pub async fn create(&self, creator_id: i64, input: &CommunityInput) -> Result<Community, DbError> {
        let (name, description) = input.validate()?;
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(DbError::invalid("Community name must contain letters or digits."));
        }

        let created_at = now();
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO communities (name, slug, description, icon, banner, creator_id,
                                     created_at, updated_at, member_count, is_private)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(name)
        .bind(&slug)
        .bind(description)
        .bind(input.icon.as_deref())
        .bind(input.banner.as_deref())
        .bind(creator_id)
        .bind(created_at)
        .bind(created_at)
        .bind(input.is_private)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::AlreadyExists(
                    "A community with this name already exists.".to_string(),
                );
            }
            DbError::from(e)
        })?
        .last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO community_members (community_id, user_id, role, joined_at)
            VALUES (?, ?, 'admin', ?)
            "#,
        )
        .bind(id)
        .bind(creator_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(community = %slug, creator_id, "Community created");
        self.by_slug(&slug).await
    }

    /// Fails unless the actor may edit the community (admin or creator).
    pub async fn ensure_editor(&self, actor_id: i64, slug: &str) -> Result<Community, DbError> {
        let community = self.by_slug(slug).await?;
        if !self.is_admin_or_creator(&community, actor_id).await? {
            return Err(DbError::denied(
                "You do not have permission to edit this community",
            ));
        }
        Ok(community)
    }

    /// Edit a community (admin or creator). Renaming regenerates the slug.
    pub async fn edit(
        &self,
        actor_id: i64,
        slug: &str,
        input: &CommunityInput,
    ) -> Result<Community, DbError> {
        let community = self.ensure_editor(actor_id, slug).await?;
        let (name, description) = input.validate()?;
        let new_slug = if name == community.name {
            community.slug.clone()
        } else {
            slugify(name)
        };
        if new_slug.is_empty() {
            return Err(DbError::invalid("Community name must contain letters or digits."));
        }

        sqlx::query(
            r#"
            UPDATE communities SET
                name = ?, slug = ?, description = ?, is_private = ?,
                icon = COALESCE(?, icon), banner = COALESCE(?, banner), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(&new_slug)
        .bind(description)
        .bind(input.is_private)
        .bind(input.icon.as_deref())
        .bind(input.banner.as_deref())
        .bind(now())
        .bind(community.id)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::AlreadyExists(
                    "A community with this name already exists.".to_string(),
                );
            }
            DbError::from(e)
        })?;

        self.by_slug(&new_slug).await
    }

    /// Soft-delete a community (creator or superuser).
    pub async fn delete(&self, actor: &Actor, slug: &str) -> Result<(), DbError> {
        let community = self.by_slug(slug).await?;
        if community.creator_id != actor.id && !actor.is_superuser {
            return Err(DbError::denied(
                "Only the creator can delete this community.",
            ));
        }
        sqlx::query("UPDATE communities SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(now())
            .bind(community.id)
            .execute(self.pool)
            .await?;
        tracing::info!(community = %slug, actor_id = actor.id, "Community deleted");
        Ok(())
    }

    /// Active communities the user is an active member of.
    pub async fn my_communities(
        &self,
        user_id: i64,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<Page<Community>, DbError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM communities c
            JOIN community_members m ON m.community_id = c.id
            WHERE m.user_id = ? AND m.is_active = 1 AND c.is_active = 1
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        let window = PageWindow::new(page, per_page, total);

        let items = sqlx::query_as::<_, Community>(&format!(
            r#"
            {COMMUNITY_SELECT}
            JOIN community_members m ON m.community_id = c.id
            WHERE m.user_id = ? AND m.is_active = 1 AND c.is_active = 1
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(user_id)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;
        Ok(window.into_page(items))
    }
}
