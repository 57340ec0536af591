//! Security module for stdforum.
//!
//! - **Password**: Argon2 hashing with constant-time behavior for unknown accounts
//! - **Session**: random cookie tokens, stored only as SHA-256 digests
//! - **Rate Limiting**: governor-based login attempt throttling per email

pub mod password;
pub mod rate_limit;
pub mod session;

pub use rate_limit::LoginRateLimiter;
