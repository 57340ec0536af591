//! Upload storage under the configured media directory.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Where an upload belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    ProfilePhoto,
    ChatImage,
    ChatFile,
    GroupPhoto,
    CommunityIcon,
    CommunityBanner,
    CampusUpdateImage,
}

impl MediaKind {
    fn dir(self) -> &'static str {
        match self {
            Self::ProfilePhoto => "profile_photos",
            Self::ChatImage => "chat_images",
            Self::ChatFile => "chat_files",
            Self::GroupPhoto => "group_photos",
            Self::CommunityIcon => "community_icons",
            Self::CommunityBanner => "community_banners",
            Self::CampusUpdateImage => "campus_updates",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, Self::ChatFile)
    }
}

/// Writes uploads with random names under one root directory, which the
/// HTTP layer also serves at `/media`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `bytes` and return the path relative to the media root.
    ///
    /// Only the extension of the client-supplied name is kept.
    pub async fn save(
        &self,
        kind: MediaKind,
        original_name: &str,
        bytes: &[u8],
    ) -> std::io::Result<String> {
        let dir = self.root.join(kind.dir());
        fs::create_dir_all(&dir).await?;

        let name = match extension(original_name) {
            Some(ext) => format!("{}.{ext}", uuid::Uuid::new_v4()),
            None => uuid::Uuid::new_v4().to_string(),
        };
        fs::write(dir.join(&name), bytes).await?;

        let relative = format!("{}/{name}", kind.dir());
        debug!(path = %relative, size = bytes.len(), "Stored upload");
        Ok(relative)
    }

    /// Delete a stored upload. A file that is already gone is not an error.
    pub async fn remove(&self, relative: &str) {
        let Some(path) = self.resolve(relative) else {
            warn!(path = %relative, "Refusing to remove upload outside the media root");
            return;
        };
        match fs::remove_file(&path).await {
            Ok(()) => debug!(path = %relative, "Removed upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %relative, error = %e, "Failed to remove upload"),
        }
    }

    /// Absolute path of a stored upload, or `None` when the relative path
    /// could leave the media root.
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let path = Path::new(relative);
        let contained = path.components().next().is_some()
            && path.components().all(|c| matches!(c, Component::Normal(_)));
        contained.then(|| self.root.join(path))
    }
}

/// Lowercase alphanumeric extension of a file name, if any.
fn extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

/// Image uploads must carry an image extension.
pub fn is_image_name(name: &str) -> bool {
    matches!(
        extension(name).as_deref(),
        Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_sanitized() {
        assert_eq!(extension("Photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("no_extension"), None);
        assert_eq!(extension("evil.p/hp"), None);
        assert!(is_image_name("cat.webp"));
        assert!(!is_image_name("notes.pdf"));
    }

    #[tokio::test]
    async fn save_writes_under_kind_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let relative = store
            .save(MediaKind::ChatFile, "notes.pdf", b"%PDF-1.4")
            .await
            .unwrap();
        assert!(relative.starts_with("chat_files/"));
        assert!(relative.ends_with(".pdf"));

        let stored = tokio::fs::read(dir.path().join(&relative)).await.unwrap();
        assert_eq!(stored, b"%PDF-1.4");

        store.remove(&relative).await;
        assert!(!dir.path().join(&relative).exists());
        // Removing twice is harmless.
        store.remove(&relative).await;
    }

    #[tokio::test]
    async fn remove_stays_inside_the_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("media");
        let outside = parent.path().join("forum.db");
        tokio::fs::write(&outside, b"keep").await.unwrap();
        let store = MediaStore::new(&root);

        store.remove("../forum.db").await;
        store.remove(outside.to_str().unwrap()).await;
        assert!(outside.exists());
        assert!(store.resolve("").is_none());
        assert_eq!(
            store.resolve("chat_files/a.pdf"),
            Some(root.join("chat_files/a.pdf"))
        );
    }
}
