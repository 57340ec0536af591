//! Multipart form reading and upload storage.

use crate::error::{ApiError, ApiResult};
use crate::services::media::is_image_name;
use crate::services::{MediaKind, MediaStore};
use axum::body::Bytes;
use axum::extract::Multipart;
use std::collections::HashMap;

/// A file part of a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

/// A fully read multipart form. Later parts with the same name replace
/// earlier ones.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                // Browsers send an empty filename for an untouched file input.
                Some(file_name) if file_name.is_empty() => {}
                Some(file_name) => {
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.files.insert(name, Upload { file_name, bytes });
                    }
                }
                None => {
                    form.fields.insert(name, field.text().await?);
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Checkbox-style boolean: `true`, `on` or `1`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.text(name).map(str::trim), Some("true" | "on" | "1"))
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}

/// Store an upload, rejecting non-image names for image kinds.
pub async fn store(media: &MediaStore, kind: MediaKind, upload: &Upload) -> ApiResult<String> {
    if kind.is_image() && !is_image_name(&upload.file_name) {
        return Err(ApiError::Validation(
            "Please upload a valid image file.".to_string(),
        ));
    }
    Ok(media.save(kind, &upload.file_name, &upload.bytes).await?)
}

/// Store the named file part if present.
pub async fn store_optional(
    media: &MediaStore,
    form: &mut FormData,
    field: &str,
    kind: MediaKind,
) -> ApiResult<Option<String>> {
    match form.take_file(field) {
        Some(upload) => Ok(Some(store(media, kind, &upload).await?)),
        None => Ok(None),
    }
}

/// Remove files stored for a write that was then rejected.
pub async fn discard_on_error<T, E>(
    media: &MediaStore,
    result: Result<T, E>,
    stored: &[Option<&str>],
) -> Result<T, E> {
    if result.is_err() {
        for path in stored.iter().flatten() {
            media.remove(path).await;
        }
    }
    result
}
