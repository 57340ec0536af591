//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("auth.allowed_email_domains must list at least one domain")]
    NoAllowedDomains,
    #[error("auth.session_ttl_hours must be positive, got {0}")]
    InvalidSessionTtl(i64),
    #[error("limits.{0} must be positive, got {1}")]
    InvalidPageSize(&'static str, i64),
    #[error("media.max_upload_bytes must be positive")]
    ZeroUploadLimit,
    #[error("link_preview.timeout_secs must be positive")]
    ZeroPreviewTimeout,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    if config
        .auth
        .allowed_email_domains
        .iter()
        .all(|d| d.trim().is_empty())
    {
        errors.push(ValidationError::NoAllowedDomains);
    }
    if config.auth.session_ttl_hours <= 0 {
        errors.push(ValidationError::InvalidSessionTtl(
            config.auth.session_ttl_hours,
        ));
    }

    for (name, value) in config.limits.named() {
        if value <= 0 {
            errors.push(ValidationError::InvalidPageSize(name, value));
        }
    }

    if config.media.max_upload_bytes == 0 {
        errors.push(ValidationError::ZeroUploadLimit);
    }
    if config.link_preview.enabled && config.link_preview.timeout_secs == 0 {
        errors.push(ValidationError::ZeroPreviewTimeout);
    }

    if config.database.path != ":memory:" {
        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(
                config.database.path.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config::from_toml(
            r#"
[server]
name = "stdforum"

[database]
path = ":memory:"
"#,
        )
        .unwrap()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = base();
        config.server.name = "  ".to_string();
        config.auth.allowed_email_domains.clear();
        config.limits.messages_per_page = 0;
        config.limits.members_per_page = -1;
        config.database.path = "/definitely/not/here/forum.db".to_string();

        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[0], ValidationError::MissingServerName));
        assert!(matches!(errors[1], ValidationError::NoAllowedDomains));
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::InvalidPageSize("members_per_page", -1)))
        );
    }

    #[test]
    fn preview_timeout_only_checked_when_enabled() {
        let mut config = base();
        config.link_preview.timeout_secs = 0;
        assert!(validate(&config).is_err());
        config.link_preview.enabled = false;
        assert!(validate(&config).is_ok());
    }
}
