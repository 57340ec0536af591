//! Authentication configuration.

use serde::Deserialize;

/// Login domains, session lifetime and login throttling.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Email domains allowed to sign up and log in (without `@`).
    #[serde(default = "default_allowed_domains")]
    pub allowed_email_domains: Vec<String>,
    /// Domain whose accounts are marked as teachers by `mark-teachers`.
    #[serde(default = "default_teacher_domain")]
    pub teacher_domain: String,
    /// Domain whose accounts are marked as students by `mark-students`.
    #[serde(default = "default_student_domain")]
    pub student_domain: String,
    /// Session lifetime in hours (default: two weeks).
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Login attempts allowed per email per minute (default: 5).
    #[serde(default = "default_login_attempts")]
    pub login_attempts_per_minute: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allowed_email_domains: default_allowed_domains(),
            teacher_domain: default_teacher_domain(),
            student_domain: default_student_domain(),
            session_ttl_hours: default_session_ttl_hours(),
            login_attempts_per_minute: default_login_attempts(),
        }
    }
}

impl AuthConfig {
    /// True when `email` belongs to one of the allowed domains.
    pub fn email_allowed(&self, email: &str) -> bool {
        let Some((_, domain)) = email.trim().rsplit_once('@') else {
            return false;
        };
        self.allowed_email_domains
            .iter()
            .any(|allowed| allowed.trim_start_matches('@').eq_ignore_ascii_case(domain))
    }

    /// Human readable list of allowed domains for error messages.
    pub fn allowed_domains_display(&self) -> String {
        self.allowed_email_domains
            .iter()
            .map(|d| format!("@{}", d.trim_start_matches('@')))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn session_ttl_secs(&self) -> i64 {
        self.session_ttl_hours.max(1) * 3600
    }
}

fn default_allowed_domains() -> Vec<String> {
    vec!["khec.edu.np".to_string()]
}

fn default_teacher_domain() -> String {
    "khwopa.edu.np".to_string()
}

fn default_student_domain() -> String {
    "khec.edu.np".to_string()
}

fn default_session_ttl_hours() -> i64 {
    24 * 14
}

fn default_login_attempts() -> u32 {
    5
}
