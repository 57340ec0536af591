//! Test HTTP client.
//!
//! Wraps a cookie-carrying reqwest client so each instance behaves like
//! one logged-in browser session. Every call returns the status and the
//! decoded JSON body.

use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

pub struct TestClient {
    http: reqwest::Client,
    base: String,
}

#[allow(dead_code)]
impl TestClient {
    pub fn new(base: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base: base.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn decode(response: reqwest::Response) -> anyhow::Result<(StatusCode, Value)> {
        let status = response.status();
        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, body))
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<(StatusCode, Value)> {
        Self::decode(self.http.get(self.url(path)).send().await?).await
    }

    /// GET returning the raw body, for served media.
    pub async fn get_bytes(&self, path: &str) -> anyhow::Result<(StatusCode, Vec<u8>)> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        Ok((status, response.bytes().await?.to_vec()))
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<(StatusCode, Value)> {
        Self::decode(self.http.delete(self.url(path)).send().await?).await
    }

    pub async fn post(&self, path: &str) -> anyhow::Result<(StatusCode, Value)> {
        Self::decode(self.http.post(self.url(path)).send().await?).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> anyhow::Result<(StatusCode, Value)> {
        Self::decode(self.http.post(self.url(path)).json(&body).send().await?).await
    }

    pub async fn put_json(&self, path: &str, body: Value) -> anyhow::Result<(StatusCode, Value)> {
        Self::decode(self.http.put(self.url(path)).json(&body).send().await?).await
    }

    /// POST a multipart form of text fields plus optional `(field, file name, bytes)` files.
    pub async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &[u8])],
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }
        for (name, file_name, bytes) in files {
            form = form.part(
                name.to_string(),
                Part::bytes(bytes.to_vec()).file_name(file_name.to_string()),
            );
        }
        Self::decode(self.http.post(self.url(path)).multipart(form).send().await?).await
    }

    /// Log in, failing the test on any non-success response.
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<Value> {
        let (status, body) = self
            .post_json(
                "/api/auth/login",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        anyhow::ensure!(status.is_success(), "login failed ({status}): {body}");
        Ok(body)
    }

    /// Id of the logged-in user.
    pub async fn id(&self) -> anyhow::Result<i64> {
        let (_, body) = self.get("/api/me").await?;
        body["user"]["id"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("no user id in {body}"))
    }

    /// Reputation from the public profile summary.
    pub async fn reputation(&self) -> anyhow::Result<i64> {
        let id = self.id().await?;
        let (_, body) = self.get(&format!("/api/users/{id}")).await?;
        body["reputation"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("no reputation in {body}"))
    }
}
