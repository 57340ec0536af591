//! Account repository: users, their profiles and domain based role marking.

use super::{DbError, is_unique_violation, now};
use crate::security::password::{dummy_password_verify, hash_password, verify_password};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Whether an account belongs to a student or a teacher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum UserType {
    Student,
    Teacher,
}

/// A forum account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: i64,
    pub last_login: Option<i64>,
}

/// Profile metadata attached 1:1 to a user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: i64,
    pub full_name: String,
    pub title: String,
    pub location: String,
    pub about_me: String,
    pub website_link: String,
    pub github_link: String,
    pub twitter_link: String,
    pub profile_photo: Option<String>,
    pub user_type: UserType,
    pub is_verified: bool,
    pub reputation: i64,
    pub helpful_flags: i64,
    pub password_change_required: bool,
    /// Catalog badge the user is working toward, shown first on the profile.
    pub targeted_badge: Option<String>,
}

/// Compact user view used by listings, search and chat.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub profile_photo: Option<String>,
    pub user_type: UserType,
    pub reputation: i64,
}

/// Input for account creation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub user_type: UserType,
    pub password_change_required: bool,
}

impl NewAccount {
    pub fn student(username: &str, email: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            is_staff: false,
            is_superuser: false,
            user_type: UserType::Student,
            password_change_required: false,
        }
    }
}

/// Editable profile fields. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub website_link: Option<String>,
    pub github_link: Option<String>,
    pub twitter_link: Option<String>,
}

/// Result of a bulk `mark_by_domain` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainMarkSummary {
    pub found: u64,
    pub updated: u64,
    pub already: u64,
    pub updated_usernames: Vec<String>,
}

const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.is_staff, u.is_superuser, u.is_active, u.date_joined, u.last_login";

pub(crate) const SUMMARY_COLUMNS: &str =
    "u.id, u.username, p.full_name, p.profile_photo, p.user_type, p.reputation";

/// Repository for account operations.
pub struct AccountRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new account repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user and its profile.
    ///
    /// Uses a transaction so a user never exists without a profile.
    pub async fn create(&self, account: NewAccount) -> Result<User, DbError> {
        let password_hash =
            hash_password(&account.password).map_err(|e| DbError::Internal(e.to_string()))?;
        let now = now();
        let username = account.username.trim().to_string();
        let email = account.email.trim().to_string();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, is_staff, is_superuser, date_joined)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&username)
        .bind(&email)
        .bind(&password_hash)
        .bind(account.is_staff)
        .bind(account.is_superuser)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::AccountExists(username.clone());
            }
            DbError::from(e)
        })?;

        let user_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, user_type, is_verified, password_change_required)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(account.user_type)
        .bind(account.user_type == UserType::Teacher)
        .bind(account.password_change_required)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(User {
            id: user_id,
            username,
            email,
            is_staff: account.is_staff,
            is_superuser: account.is_superuser,
            is_active: true,
            date_joined: now,
            last_login: None,
        })
    }

    /// Verify email and password, returning the user and stamping `last_login`.
    ///
    /// Unknown emails still pay for an Argon2 verification so response time
    /// does not reveal which addresses are registered.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, DbError> {
        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, password_hash FROM users WHERE email = ? COLLATE NOCASE AND is_active = 1",
        )
        .bind(email.trim())
        .fetch_optional(self.pool)
        .await?;

        let Some((id, password_hash)) = row else {
            dummy_password_verify(password);
            return Err(DbError::AccountNotFound(email.to_string()));
        };

        if !verify_password(password, &password_hash) {
            return Err(DbError::InvalidPassword);
        }

        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(now())
            .bind(id)
            .execute(self.pool)
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::AccountNotFound(email.to_string()))
    }

    /// Find user by id.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Find user by username (case-insensitive).
    #[cfg(test)]
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.username = ? COLLATE NOCASE"
        ))
        .bind(username.trim())
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Load the profile of a user.
    pub async fn profile(&self, user_id: i64) -> Result<Profile, DbError> {
        sqlx::query_as::<_, Profile>(
            r#"
            SELECT user_id, full_name, title, location, about_me, website_link, github_link,
                   twitter_link, profile_photo, user_type, is_verified, reputation,
                   helpful_flags, password_change_required, targeted_badge
            FROM profiles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found(format!("profile for user {user_id}")))
    }

    /// Apply a partial profile update and return the stored profile.
    pub async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<Profile, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE profiles SET
                full_name = COALESCE(?, full_name),
                title = COALESCE(?, title),
                location = COALESCE(?, location),
                about_me = COALESCE(?, about_me),
                website_link = COALESCE(?, website_link),
                github_link = COALESCE(?, github_link),
                twitter_link = COALESCE(?, twitter_link)
            WHERE user_id = ?
            "#,
        )
        .bind(update.full_name.as_deref().map(str::trim))
        .bind(update.title.as_deref().map(str::trim))
        .bind(update.location.as_deref().map(str::trim))
        .bind(update.about_me.as_deref().map(str::trim))
        .bind(update.website_link.as_deref().map(str::trim))
        .bind(update.github_link.as_deref().map(str::trim))
        .bind(update.twitter_link.as_deref().map(str::trim))
        .bind(user_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("profile for user {user_id}")));
        }
        self.profile(user_id).await
    }

    /// Replace the stored profile photo path.
    pub async fn set_profile_photo(&self, user_id: i64, path: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE profiles SET profile_photo = ? WHERE user_id = ?")
            .bind(path)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Set or clear the badge the user is working toward.
    pub async fn set_targeted_badge(&self, user_id: i64, badge: Option<&str>) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE profiles SET targeted_badge = ? WHERE user_id = ?")
            .bind(badge)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("profile for user {user_id}")));
        }
        Ok(())
    }

    /// Change the email address of a user.
    pub async fn update_email(&self, user_id: i64, email: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind(email.trim())
            .bind(user_id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return DbError::AlreadyExists("This email is already in use.".to_string());
                }
                DbError::from(e)
            })?;
        Ok(())
    }

    /// Set a new password and clear the forced-change flag.
    pub async fn change_password(&self, user_id: i64, password: &str) -> Result<(), DbError> {
        let password_hash =
            hash_password(password).map_err(|e| DbError::Internal(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE profiles SET password_change_required = 0 WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Users whose username contains `q` (case-insensitive).
    pub async fn search(&self, q: &str, limit: i64) -> Result<Vec<UserSummary>, DbError> {
        let pattern = format!("%{}%", q.trim());
        let users = sqlx::query_as::<_, UserSummary>(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS}
            FROM users u JOIN profiles p ON p.user_id = u.id
            WHERE u.username LIKE ? AND u.is_active = 1
            ORDER BY u.username
            LIMIT ?
            "#
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(users)
    }

    /// Every active user, by username.
    pub async fn list_all(&self) -> Result<Vec<UserSummary>, DbError> {
        let users = sqlx::query_as::<_, UserSummary>(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS}
            FROM users u JOIN profiles p ON p.user_id = u.id
            WHERE u.is_active = 1
            ORDER BY u.username
            "#
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(users)
    }

    /// Set `user_type` (and `is_verified`) for every user whose email ends in `@domain`.
    pub async fn mark_by_domain(
        &self,
        domain: &str,
        user_type: UserType,
    ) -> Result<DomainMarkSummary, DbError> {
        let suffix = format!("%@{}", domain.trim().trim_start_matches('@'));
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, (i64, String, UserType)>(
            r#"
            SELECT u.id, u.username, p.user_type
            FROM users u JOIN profiles p ON p.user_id = u.id
            WHERE u.email LIKE ?
            ORDER BY u.id
            "#,
        )
        .bind(&suffix)
        .fetch_all(&mut *tx)
        .await?;

        let mut summary = DomainMarkSummary {
            found: rows.len() as u64,
            ..DomainMarkSummary::default()
        };

        for (id, username, current) in rows {
            if current == user_type {
                summary.already += 1;
                continue;
            }
            sqlx::query("UPDATE profiles SET user_type = ?, is_verified = 1 WHERE user_id = ?")
                .bind(user_type)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            summary.updated += 1;
            summary.updated_usernames.push(username);
        }

        tx.commit().await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_then_authenticate() {
        let db = db().await;
        let repo = db.accounts();
        let user = repo
            .create(NewAccount::student("ram", "ram@khec.edu.np", "pw-ram-123"))
            .await
            .unwrap();

        let profile = repo.profile(user.id).await.unwrap();
        assert_eq!(profile.user_type, UserType::Student);
        assert_eq!(profile.reputation, 0);
        assert!(!profile.password_change_required);

        let authed = repo.authenticate("RAM@khec.edu.np", "pw-ram-123").await.unwrap();
        assert_eq!(authed.id, user.id);
        assert!(authed.last_login.is_some());

        assert!(matches!(
            repo.authenticate("ram@khec.edu.np", "wrong").await,
            Err(DbError::InvalidPassword)
        ));
        assert!(matches!(
            repo.authenticate("nobody@khec.edu.np", "pw").await,
            Err(DbError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn usernames_and_emails_are_unique_ignoring_case() {
        let db = db().await;
        let repo = db.accounts();
        repo.create(NewAccount::student("ram", "ram@khec.edu.np", "pw-ram-123"))
            .await
            .unwrap();

        assert!(matches!(
            repo.create(NewAccount::student("RAM", "other@khec.edu.np", "pw-ram-123"))
                .await,
            Err(DbError::AccountExists(_))
        ));
        assert!(matches!(
            repo.create(NewAccount::student("hari", "Ram@KHEC.edu.np", "pw-ram-123"))
                .await,
            Err(DbError::AccountExists(_))
        ));
    }

    #[tokio::test]
    async fn profile_update_is_partial() {
        let db = db().await;
        let repo = db.accounts();
        let user = repo
            .create(NewAccount::student("sita", "sita@khec.edu.np", "pw-sita-123"))
            .await
            .unwrap();

        repo.update_profile(
            user.id,
            &ProfileUpdate {
                full_name: Some(" Sita Sharma ".to_string()),
                location: Some("Bhaktapur".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
        let profile = repo
            .update_profile(
                user.id,
                &ProfileUpdate {
                    title: Some("BE Computer".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(profile.full_name, "Sita Sharma");
        assert_eq!(profile.location, "Bhaktapur");
        assert_eq!(profile.title, "BE Computer");
    }

    #[tokio::test]
    async fn targeted_badge_is_set_and_cleared() {
        let db = db().await;
        let repo = db.accounts();
        let user = repo
            .create(NewAccount::student("gopal", "gopal@khec.edu.np", "pw-gopal-123"))
            .await
            .unwrap();

        assert_eq!(repo.profile(user.id).await.unwrap().targeted_badge, None);
        repo.set_targeted_badge(user.id, Some("Civic Duty")).await.unwrap();
        assert_eq!(
            repo.profile(user.id).await.unwrap().targeted_badge.as_deref(),
            Some("Civic Duty")
        );
        repo.set_targeted_badge(user.id, None).await.unwrap();
        assert_eq!(repo.profile(user.id).await.unwrap().targeted_badge, None);
        assert!(matches!(
            repo.set_targeted_badge(9999, Some("Critic")).await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn change_password_clears_required_flag() {
        let db = db().await;
        let repo = db.accounts();
        let mut account = NewAccount::student("gita", "gita@khec.edu.np", "first-pass-1");
        account.password_change_required = true;
        let user = repo.create(account).await.unwrap();
        assert!(repo.profile(user.id).await.unwrap().password_change_required);

        repo.change_password(user.id, "second-pass-2").await.unwrap();
        assert!(!repo.profile(user.id).await.unwrap().password_change_required);
        assert!(repo.authenticate("gita@khec.edu.np", "second-pass-2").await.is_ok());
    }

    #[tokio::test]
    async fn update_email_rejects_taken_address() {
        let db = db().await;
        let repo = db.accounts();
        let a = repo
            .create(NewAccount::student("a", "a@khec.edu.np", "pw-aaaa-123"))
            .await
            .unwrap();
        repo.create(NewAccount::student("b", "b@khec.edu.np", "pw-bbbb-123"))
            .await
            .unwrap();

        assert!(matches!(
            repo.update_email(a.id, "b@khec.edu.np").await,
            Err(DbError::AlreadyExists(_))
        ));
        repo.update_email(a.id, "a2@khec.edu.np").await.unwrap();
        assert!(repo.authenticate("a2@khec.edu.np", "pw-aaaa-123").await.is_ok());
    }

    #[tokio::test]
    async fn search_matches_substring() {
        let db = db().await;
        let repo = db.accounts();
        for name in ["ramesh", "paramount", "sita"] {
            repo.create(NewAccount::student(
                name,
                &format!("{name}@khec.edu.np"),
                "pw-search-123",
            ))
            .await
            .unwrap();
        }
        let hits = repo.search("RAM", 50).await.unwrap();
        let names: Vec<_> = hits.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["paramount", "ramesh"]);
        assert_eq!(repo.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn mark_by_domain_counts() {
        let db = db().await;
        let repo = db.accounts();
        repo.create(NewAccount::student("t1", "t1@khwopa.edu.np", "pw-t1-12345"))
            .await
            .unwrap();
        repo.create(NewAccount::student("t2", "t2@khwopa.edu.np", "pw-t2-12345"))
            .await
            .unwrap();
        repo.create(NewAccount::student("s1", "s1@khec.edu.np", "pw-s1-12345"))
            .await
            .unwrap();

        let first = repo
            .mark_by_domain("khwopa.edu.np", UserType::Teacher)
            .await
            .unwrap();
        assert_eq!((first.found, first.updated, first.already), (2, 2, 0));

        let second = repo
            .mark_by_domain("@khwopa.edu.np", UserType::Teacher)
            .await
            .unwrap();
        assert_eq!((second.found, second.updated, second.already), (2, 0, 2));

        let t1 = repo.find_by_username("t1").await.unwrap().unwrap();
        let profile = repo.profile(t1.id).await.unwrap();
        assert_eq!(profile.user_type, UserType::Teacher);
        assert!(profile.is_verified);

        let s1 = repo.find_by_username("s1").await.unwrap().unwrap();
        assert_eq!(repo.profile(s1.id).await.unwrap().user_type, UserType::Student);
    }
}
