//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, DatabaseConfig, MediaConfig)
//! - [`auth`]: Login domains, sessions and login throttling (AuthConfig)
//! - [`limits`]: Page sizes for every paginated listing (LimitsConfig)
//! - [`validation`]: Startup validation collecting every problem at once

mod auth;
mod limits;
mod types;
pub mod validation;

pub use auth::AuthConfig;
pub use types::{Config, LinkPreviewConfig};
