//! Integration test common infrastructure.
//!
//! Spawns the forum binary against a throwaway database and drives its
//! JSON API through a cookie-carrying HTTP client.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;

/// Password given to every account created by the harness.
#[allow(dead_code)]
pub const PASSWORD: &str = "campus-pass-2026";
