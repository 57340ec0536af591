//! Campus update (notice board) repository.
//!
//! Teachers, staff and superusers post notices. Readers only see published,
//! unexpired notices; authors and superusers see their own drafts.

use super::{Actor, DbError, Page, PageWindow, UserType, now};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Badge colour shown next to the notice.
    pub fn color(self) -> &'static str {
        match self {
            Self::Low => "#28a745",
            Self::Medium => "#ffc107",
            Self::High => "#fd7e14",
            Self::Urgent => "#dc3545",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Academic,
    Event,
    Maintenance,
    Holiday,
    #[default]
    Announcement,
    Other,
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "academic" => Some(Self::Academic),
            "event" => Some(Self::Event),
            "maintenance" => Some(Self::Maintenance),
            "holiday" => Some(Self::Holiday),
            "announcement" => Some(Self::Announcement),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CampusUpdate {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_username: String,
    pub priority: Priority,
    pub category: Category,
    pub image: Option<String>,
    pub is_published: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub expiry_date: Option<i64>,
    #[sqlx(skip)]
    pub priority_color: &'static str,
    #[sqlx(skip)]
    pub is_expired: bool,
}

impl CampusUpdate {
    pub fn expired_at(&self, at: i64) -> bool {
        self.expiry_date.is_some_and(|expiry| at > expiry)
    }

    fn decorate(mut self) -> Self {
        self.priority_color = self.priority.color();
        self.is_expired = self.expired_at(now());
        self
    }
}

/// Form fields for create and edit.
#[derive(Debug, Clone, Deserialize)]
pub struct CampusUpdateInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default = "default_published")]
    pub is_published: bool,
    #[serde(default)]
    pub expiry_date: Option<i64>,
    #[serde(skip)]
    pub image: Option<String>,
}

fn default_published() -> bool {
    true
}

impl CampusUpdateInput {
    fn validate(&self) -> Result<(&str, &str), DbError> {
        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(DbError::invalid(format!(
                "Title is required and must be at most {MAX_TITLE_LEN} characters."
            )));
        }
        if content.is_empty() {
            return Err(DbError::invalid("Content is required."));
        }
        Ok((title, content))
    }
}

/// Listing filters; empty values are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampusUpdateFilter {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

const UPDATE_SELECT: &str = r#"
    SELECT c.id, c.title, c.content, c.author_id, u.username AS author_username, c.priority,
           c.category, c.image, c.is_published, c.created_at, c.updated_at, c.expiry_date
    FROM campus_updates c JOIN users u ON u.id = c.author_id
"#;

pub struct CampusUpdateRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CampusUpdateRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Teachers, staff and superusers may post notices.
    pub async fn can_post(&self, actor: &Actor) -> Result<bool, DbError> {
        if actor.is_moderator() {
            return Ok(true);
        }
        let user_type: Option<UserType> =
            sqlx::query_scalar("SELECT user_type FROM profiles WHERE user_id = ?")
                .bind(actor.id)
                .fetch_optional(self.pool)
                .await?;
        Ok(user_type == Some(UserType::Teacher))
    }

    async fn require_poster(&self, actor: &Actor) -> Result<(), DbError> {
        if self.can_post(actor).await? {
            return Ok(());
        }
        Err(DbError::denied(
            "Only teachers and administrators can manage campus updates.",
        ))
    }

    async fn load(&self, id: i64) -> Result<CampusUpdate, DbError> {
        sqlx::query_as::<_, CampusUpdate>(&format!("{UPDATE_SELECT} WHERE c.id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(CampusUpdate::decorate)
            .ok_or_else(|| DbError::not_found("Campus update"))
    }

    /// Published, unexpired notices, newest first.
    pub async fn list(
        &self,
        filter: &CampusUpdateFilter,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<Page<CampusUpdate>, DbError> {
        let where_clause = r#"
            WHERE c.is_published = 1
              AND (c.expiry_date IS NULL OR c.expiry_date >= ?1)
              AND (c.title LIKE ?2 OR c.content LIKE ?2)
              AND (?3 IS NULL OR c.category = ?3)
              AND (?4 IS NULL OR c.priority = ?4)
        "#;
        let pattern = format!("%{}%", filter.search.trim());
        let at = now();

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM campus_updates c {where_clause}"
        ))
        .bind(at)
        .bind(&pattern)
        .bind(filter.category)
        .bind(filter.priority)
        .fetch_one(self.pool)
        .await?;
        let window = PageWindow::new(page, per_page, total);

        let items = sqlx::query_as::<_, CampusUpdate>(&format!(
            "{UPDATE_SELECT} {where_clause} ORDER BY c.created_at DESC, c.id DESC LIMIT ?5 OFFSET ?6"
        ))
        .bind(at)
        .bind(&pattern)
        .bind(filter.category)
        .bind(filter.priority)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(window.into_page(items.into_iter().map(CampusUpdate::decorate).collect()))
    }

    /// One notice. Unpublished notices are visible to their author and superusers only.
    pub async fn detail(&self, viewer: &Actor, id: i64) -> Result<CampusUpdate, DbError> {
        let update = self.load(id).await?;
        if !update.is_published && update.author_id != viewer.id && !viewer.is_superuser {
            return Err(DbError::not_found("Campus update"));
        }
        Ok(update)
    }

    pub async fn create(
        &self,
        actor: &Actor,
        input: &CampusUpdateInput,
    ) -> Result<CampusUpdate, DbError> {
        self.require_poster(actor).await?;
        let (title, content) = input.validate()?;

        let created_at = now();
        let id = sqlx::query(
            r#"
            INSERT INTO campus_updates (title, content, author_id, priority, category, image,
                                        is_published, created_at, updated_at, expiry_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(actor.id)
        .bind(input.priority)
        .bind(input.category)
        .bind(input.image.as_deref())
        .bind(input.is_published)
        .bind(created_at)
        .bind(created_at)
        .bind(input.expiry_date)
        .execute(self.pool)
        .await?
        .last_insert_rowid();

        tracing::info!(update_id = id, author_id = actor.id, "Campus update posted");
        self.load(id).await
    }

    /// Fails unless the actor may post and is the author or a superuser.
    async fn require_owner(&self, actor: &Actor, id: i64, verb: &str) -> Result<CampusUpdate, DbError> {
        self.require_poster(actor).await?;
        let update = self.load(id).await?;
        if update.author_id != actor.id && !actor.is_superuser {
            return Err(DbError::denied(format!(
                "You do not have permission to {verb} this update."
            )));
        }
        Ok(update)
    }

    /// Fails unless the actor may edit the notice.
    pub async fn ensure_editable(&self, actor: &Actor, id: i64) -> Result<(), DbError> {
        self.require_owner(actor, id, "edit").await.map(|_| ())
    }

    pub async fn edit(
        &self,
        actor: &Actor,
        id: i64,
        input: &CampusUpdateInput,
    ) -> Result<CampusUpdate, DbError> {
        self.require_owner(actor, id, "edit").await?;
        let (title, content) = input.validate()?;

        sqlx::query(
            r#"
            UPDATE campus_updates SET
                title = ?, content = ?, priority = ?, category = ?,
                image = COALESCE(?, image), is_published = ?, expiry_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(input.priority)
        .bind(input.category)
        .bind(input.image.as_deref())
        .bind(input.is_published)
        .bind(input.expiry_date)
        .bind(now())
        .bind(id)
        .execute(self.pool)
        .await?;
        self.load(id).await
    }

    pub async fn delete(&self, actor: &Actor, id: i64) -> Result<(), DbError> {
        self.require_owner(actor, id, "delete").await?;
        sqlx::query("DELETE FROM campus_updates WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        tracing::info!(update_id = id, actor_id = actor.id, "Campus update deleted");
        Ok(())
    }

    /// The management table: every notice for superusers, one's own otherwise.
    pub async fn manage(
        &self,
        actor: &Actor,
        search: &str,
        page: Option<i64>,
        per_page: i64,
    ) -> Result<Page<CampusUpdate>, DbError> {
        self.require_poster(actor).await?;
        let where_clause = r#"
            WHERE (?1 = 1 OR c.author_id = ?2)
              AND (c.title LIKE ?3 OR c.content LIKE ?3)
        "#;
        let pattern = format!("%{}%", search.trim());

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM campus_updates c {where_clause}"
        ))
        .bind(actor.is_superuser)
        .bind(actor.id)
        .bind(&pattern)
        .fetch_one(self.pool)
        .await?;
        let window = PageWindow::new(page, per_page, total);

        let items = sqlx::query_as::<_, CampusUpdate>(&format!(
            "{UPDATE_SELECT} {where_clause} ORDER BY c.created_at DESC, c.id DESC LIMIT ?4 OFFSET ?5"
        ))
        .bind(actor.is_superuser)
        .bind(actor.id)
        .bind(&pattern)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(window.into_page(items.into_iter().map(CampusUpdate::decorate).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::qa::test_support::{actor, user};
    use crate::db::{Database, NewAccount, User};

    async fn teacher(db: &Database, name: &str) -> User {
        db.accounts()
            .create(NewAccount {
                user_type: UserType::Teacher,
                ..NewAccount::student(name, &format!("{name}@khwopa.edu.np"), "pw-test-1234")
            })
            .await
            .unwrap()
    }

    fn notice(title: &str) -> CampusUpdateInput {
        CampusUpdateInput {
            title: title.to_string(),
            content: format!("{title} details for everyone."),
            priority: Priority::default(),
            category: Category::default(),
            is_published: true,
            expiry_date: None,
            image: None,
        }
    }

    #[test]
    fn priority_colours() {
        assert_eq!(Priority::parse("low").map(Priority::color), Some("#28a745"));
        assert_eq!(Priority::parse("urgent").map(Priority::color), Some("#dc3545"));
        assert_eq!(Priority::parse("bogus"), None);
        assert_eq!(Priority::High.color(), "#fd7e14");
    }

    #[tokio::test]
    async fn only_teachers_and_staff_post() {
        let db = Database::new(":memory:").await.unwrap();
        let student = user(&db, "ram").await;
        let prof = teacher(&db, "prof").await;
        let updates = db.campus_updates();

        assert!(matches!(
            updates.create(&actor(&student), &notice("Exam week")).await,
            Err(DbError::InsufficientAccess(_))
        ));
        let created = updates.create(&actor(&prof), &notice("Exam week")).await.unwrap();
        assert_eq!(created.priority_color, "#ffc107");
        assert!(!created.is_expired);

        let staff = Actor {
            is_staff: true,
            ..actor(&student)
        };
        assert!(updates.create(&staff, &notice("Staff notice")).await.is_ok());
    }

    #[tokio::test]
    async fn listing_hides_drafts_and_expired_and_filters() {
        let db = Database::new(":memory:").await.unwrap();
        let prof = teacher(&db, "prof").await;
        let reader = user(&db, "ram").await;
        let updates = db.campus_updates();
        let author = actor(&prof);

        let mut holiday = notice("Dashain holiday");
        holiday.category = Category::Holiday;
        holiday.priority = Priority::High;
        updates.create(&author, &holiday).await.unwrap();
        updates.create(&author, &notice("Library hours")).await.unwrap();

        let mut draft = notice("Draft notice");
        draft.is_published = false;
        let draft = updates.create(&author, &draft).await.unwrap();

        let mut expired = notice("Old notice");
        expired.expiry_date = Some(now() - 60);
        let expired = updates.create(&author, &expired).await.unwrap();
        assert!(expired.is_expired);

        let all = updates.list(&CampusUpdateFilter::default(), None, 10).await.unwrap();
        assert_eq!(all.total, 2);

        let holidays = updates
            .list(
                &CampusUpdateFilter {
                    category: Some(Category::Holiday),
                    ..CampusUpdateFilter::default()
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(holidays.total, 1);
        assert_eq!(holidays.items[0].priority, Priority::High);

        let searched = updates
            .list(
                &CampusUpdateFilter {
                    search: "library".into(),
                    ..CampusUpdateFilter::default()
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(searched.total, 1);

        assert!(updates.detail(&actor(&reader), draft.id).await.is_err());
        assert!(updates.detail(&author, draft.id).await.is_ok());
    }

    #[tokio::test]
    async fn edit_delete_and_manage_are_scoped_to_author() {
        let db = Database::new(":memory:").await.unwrap();
        let prof = teacher(&db, "prof").await;
        let other = teacher(&db, "other").await;
        let updates = db.campus_updates();
        let created = updates.create(&actor(&prof), &notice("Lab closed")).await.unwrap();
        updates.create(&actor(&other), &notice("Sports day")).await.unwrap();

        assert!(updates.edit(&actor(&other), created.id, &notice("Hijack")).await.is_err());
        let edited = updates
            .edit(&actor(&prof), created.id, &notice("Lab reopened"))
            .await
            .unwrap();
        assert_eq!(edited.title, "Lab reopened");

        let mine = updates.manage(&actor(&prof), "", None, 10).await.unwrap();
        assert_eq!(mine.total, 1);
        let root = Actor {
            is_superuser: true,
            ..actor(&prof)
        };
        assert_eq!(updates.manage(&root, "", None, 10).await.unwrap().total, 2);
        assert_eq!(updates.manage(&root, "sports", None, 10).await.unwrap().total, 1);

        assert!(updates.delete(&actor(&other), created.id).await.is_err());
        updates.delete(&actor(&prof), created.id).await.unwrap();
        assert!(matches!(
            updates.detail(&actor(&prof), created.id).await,
            Err(DbError::NotFound(_))
        ));
    }
}
