//! Link preview fetching for chat link messages.
//!
//! Every failure falls back to a preview built from the URL alone, so a
//! slow or broken site never blocks sending the message.

use crate::config::LinkPreviewConfig;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("previews are disabled")]
    Disabled,
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
}

/// Page metadata attached to a link message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkPreview {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
}

impl LinkPreview {
    /// Preview used when the page cannot be fetched.
    pub fn fallback(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: url.to_string(),
            description: String::new(),
            image: None,
        }
    }
}

#[async_trait]
pub trait LinkPreviewer: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<LinkPreview, PreviewError>;

    /// Fetch, falling back to the URL-only preview on any error.
    async fn preview(&self, url: &str) -> LinkPreview {
        match self.fetch(url).await {
            Ok(preview) => {
                crate::metrics::record_link_preview("ok");
                preview
            }
            Err(e) => {
                crate::metrics::record_link_preview("failed");
                debug!(url = %url, error = %e, "Link preview failed, using fallback");
                LinkPreview::fallback(url)
            }
        }
    }
}

/// Fetches pages over HTTP and reads their OpenGraph tags.
pub struct HttpPreviewer {
    client: Client,
    max_body_bytes: usize,
}

impl HttpPreviewer {
    pub fn new(config: &LinkPreviewConfig) -> Result<Self, PreviewError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// The previewer for this configuration; disabled previews never fetch.
pub fn from_config(config: &LinkPreviewConfig) -> Result<Arc<dyn LinkPreviewer>, PreviewError> {
    if config.enabled {
        Ok(Arc::new(HttpPreviewer::new(config)?))
    } else {
        Ok(Arc::new(NoopPreviewer))
    }
}

#[async_trait]
impl LinkPreviewer for HttpPreviewer {
    async fn fetch(&self, url: &str) -> Result<LinkPreview, PreviewError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PreviewError::UnsupportedUrl(url.to_string()));
        }

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PreviewError::Status(response.status().as_u16()));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() >= self.max_body_bytes {
                body.truncate(self.max_body_bytes);
                break;
            }
        }

        Ok(parse_preview(url, &String::from_utf8_lossy(&body)))
    }
}

/// Previewer that never touches the network.
pub struct NoopPreviewer;

#[async_trait]
impl LinkPreviewer for NoopPreviewer {
    async fn fetch(&self, _url: &str) -> Result<LinkPreview, PreviewError> {
        Err(PreviewError::Disabled)
    }
}

struct Selectors {
    og_title: Selector,
    title: Selector,
    og_description: Selector,
    og_image: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let parse = |s: &str| Selector::parse(s).expect("static selector is valid");
        Selectors {
            og_title: parse(r#"meta[property="og:title"]"#),
            title: parse("title"),
            og_description: parse(r#"meta[property="og:description"]"#),
            og_image: parse(r#"meta[property="og:image"]"#),
        }
    })
}

/// Extract preview fields: `og:title`, then `<title>`, then the URL itself.
pub fn parse_preview(url: &str, html: &str) -> LinkPreview {
    let document = Html::parse_document(html);
    let s = selectors();

    let meta = |selector: &Selector| {
        document
            .select(selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(str::to_string)
    };

    let title = meta(&s.og_title)
        .or_else(|| {
            document
                .select(&s.title)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .find(|text| !text.is_empty())
        })
        .unwrap_or_else(|| url.to_string());

    LinkPreview {
        url: url.to_string(),
        title,
        description: meta(&s.og_description).unwrap_or_default(),
        image: meta(&s.og_image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opengraph_tags_win() {
        let html = r#"
            <html><head>
              <title>Fallback title</title>
              <meta property="og:title" content="Rust Book">
              <meta property="og:description" content="Learn Rust">
              <meta property="og:image" content="https://example.com/cover.png">
            </head></html>
        "#;
        let preview = parse_preview("https://doc.rust-lang.org/book", html);
        assert_eq!(preview.title, "Rust Book");
        assert_eq!(preview.description, "Learn Rust");
        assert_eq!(preview.image.as_deref(), Some("https://example.com/cover.png"));
    }

    #[test]
    fn falls_back_to_title_then_url() {
        let preview = parse_preview("https://a.example", "<title> Plain page </title>");
        assert_eq!(preview.title, "Plain page");
        assert_eq!(preview.description, "");
        assert_eq!(preview.image, None);

        let preview = parse_preview("https://b.example", "<p>no head</p>");
        assert_eq!(preview.title, "https://b.example");
    }

    #[tokio::test]
    async fn disabled_previews_never_fetch() {
        let config = LinkPreviewConfig {
            enabled: false,
            ..LinkPreviewConfig::default()
        };
        let previewer = from_config(&config).unwrap();
        assert_eq!(
            previewer.preview("https://example.com").await,
            LinkPreview::fallback("https://example.com")
        );
    }

    #[tokio::test]
    async fn non_http_urls_are_not_fetched() {
        let previewer = HttpPreviewer::new(&LinkPreviewConfig::default()).unwrap();
        assert!(matches!(
            previewer.fetch("ftp://files.example").await,
            Err(PreviewError::UnsupportedUrl(_))
        ));
        assert_eq!(
            previewer.preview("ftp://files.example").await,
            LinkPreview::fallback("ftp://files.example")
        );
    }
}
