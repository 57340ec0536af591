//! Test server management.
//!
//! Spawns and manages stdforum instances for integration testing.

use super::PASSWORD;
use super::client::TestClient;
use std::net::TcpListener;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::time::sleep;

pub const ADMIN_EMAIL: &str = "admin@khec.edu.np";
pub const ADMIN_PASSWORD: &str = "admin-pass-2026";

/// A running server backed by a temporary directory.
pub struct TestServer {
    child: Child,
    port: u16,
    data_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Spawn a server on a free port with a bootstrap admin account.
    pub async fn spawn() -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let port = free_port()?;
        let config_path = data_dir.path().join("config.toml");
        std::fs::write(&config_path, config(data_dir.path(), port))?;

        let status = Command::new(env!("CARGO_BIN_EXE_stdforum"))
            .arg("--config")
            .arg(&config_path)
            .args(["create-admin", "--username", "admin", "--email", ADMIN_EMAIL])
            .env("STDFORUM_ADMIN_PASSWORD", ADMIN_PASSWORD)
            .stdout(Stdio::null())
            .status()
            .await?;
        anyhow::ensure!(status.success(), "create-admin failed: {status}");

        let child = Command::new(env!("CARGO_BIN_EXE_stdforum"))
            .arg("--config")
            .arg(&config_path)
            .arg("serve")
            .env("RUST_LOG", "warn")
            .kill_on_drop(true)
            .spawn()?;

        let server = Self {
            child,
            port,
            data_dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until `/health` answers.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if let Ok(response) = client.get(format!("{}/health", self.base_url())).send().await
                && response.status().is_success()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Number of stored uploads under the media directory.
    pub fn media_files(&self) -> usize {
        fn count(dir: &Path) -> usize {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return 0;
            };
            entries
                .flatten()
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() { count(&path) } else { 1 }
                })
                .sum()
        }
        count(&self.data_dir.path().join("media"))
    }

    /// A client without a session.
    pub fn anonymous(&self) -> anyhow::Result<TestClient> {
        TestClient::new(&self.base_url())
    }

    /// A client logged in as the bootstrap admin.
    pub async fn admin(&self) -> anyhow::Result<TestClient> {
        let client = self.anonymous()?;
        client.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;
        Ok(client)
    }

    /// Create an account through the admin, then log in and clear the
    /// forced password change. `email` defaults to the student domain.
    pub async fn user(&self, admin: &TestClient, username: &str) -> anyhow::Result<TestClient> {
        self.user_with_email(admin, username, &format!("{username}@khec.edu.np"))
            .await
    }

    pub async fn user_with_email(
        &self,
        admin: &TestClient,
        username: &str,
        email: &str,
    ) -> anyhow::Result<TestClient> {
        let (status, body) = admin
            .post_json(
                "/api/auth/signup",
                serde_json::json!({
                    "username": username,
                    "email": email,
                    "password": PASSWORD,
                }),
            )
            .await?;
        anyhow::ensure!(status.as_u16() == 201, "signup failed: {body}");

        let client = self.anonymous()?;
        client.login(email, PASSWORD).await?;
        let (status, body) = client
            .post_json(
                "/api/auth/password",
                serde_json::json!({
                    "new_password": PASSWORD,
                    "confirm_password": PASSWORD,
                }),
            )
            .await?;
        anyhow::ensure!(status.is_success(), "password change failed: {body}");
        Ok(client)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

fn free_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn config(dir: &Path, port: u16) -> String {
    format!(
        r#"
[server]
name = "stdforum-test"
listen = "127.0.0.1:{port}"

[database]
path = "{db}"

[auth]
allowed_email_domains = ["khec.edu.np", "khwopa.edu.np"]
teacher_domain = "khwopa.edu.np"
student_domain = "khec.edu.np"
login_attempts_per_minute = 1000

[media]
upload_dir = "{media}"

[link_preview]
enabled = false
"#,
        db = dir.join("forum.db").display(),
        media = dir.join("media").display(),
    )
}
