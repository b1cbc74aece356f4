use crate::domain::CoverImage;
use crate::ports::ObjectStorage;
use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use shared::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error};

/// Validates cover images and stores them in object storage.
pub struct FileUploadService {
    storage: Arc<dyn ObjectStorage>,
    max_bytes: u64,
}

impl FileUploadService {
    pub fn new(storage: Arc<dyn ObjectStorage>, max_bytes: u64) -> Self {
        Self { storage, max_bytes }
    }

    /// Upload `image` under `folder` and return its public URL.
    pub async fn upload_image(&self, image: &CoverImage, folder: &str) -> Result<String> {
        debug!(file = %image.file_name, "uploading image");

        if !image.content_type.starts_with("image/") {
            return Err(Error::Upload("file must be an image".into()));
        }

        if image.bytes.len() as u64 > self.max_bytes {
            return Err(Error::Upload(format!(
                "file size must not exceed {} bytes",
                self.max_bytes
            )));
        }

        let path = format!("{folder}/{}", stored_file_name(&image.file_name));

        if let Err(e) = self
            .storage
            .upload(&path, image.bytes.clone(), &image.content_type)
            .await
        {
            error!(path = %path, error = %e, "image upload failed");
            return Err(Error::Upload(format!("failed to upload file: {e}")));
        }

        let url = self.storage.public_url(&path);
        debug!(url = %url, "image uploaded");
        Ok(url)
    }

    /// Remove the object behind a public URL produced by [`Self::upload_image`].
    pub async fn delete_image(&self, url: &str) -> Result<()> {
        debug!(url = %url, "deleting image");

        let path = object_path(url)
            .ok_or_else(|| Error::Upload(format!("cannot derive storage path from '{url}'")))?;

        if let Err(e) = self.storage.remove(&[path.clone()]).await {
            error!(path = %path, error = %e, "image removal failed");
            return Err(Error::Upload(format!("failed to delete file: {e}")));
        }

        Ok(())
    }
}

/// `<millis>-<random>.<ext>`, where ext is whatever follows the last dot.
fn stored_file_name(original: &str) -> String {
    let extension = original.rsplit('.').next().unwrap_or(original);
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(11)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}.{}", Utc::now().timestamp_millis(), suffix, extension)
}

/// Last two path segments of a URL: `<folder>/<file>`.
fn object_path(url: &str) -> Option<String> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let file = segments.next().filter(|s| !s.is_empty())?;
    let folder = segments.next().filter(|s| !s.is_empty())?;
    Some(format!("{folder}/{file}"))
}
