//! Image upload boundary.
//!
//! The engine only ever sees the URL an uploader returns and stores it
//! verbatim in `avatar_url`, `banner_url` or a social link's `photo_url`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;

use crate::error::{SyncError, Target, ValidationFault};
use crate::model::{Collection, OwnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Avatar,
    Banner,
    SocialPhoto,
}

impl ImageKind {
    /// The profile part an image of this kind is attached to
    pub fn target(&self) -> Target {
        match self {
            ImageKind::Avatar | ImageKind::Banner => Target::Profile,
            ImageKind::SocialPhoto => Target::Collection(Collection::SocialLinks),
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageKind::Avatar => "avatar",
            ImageKind::Banner => "banner",
            ImageKind::SocialPhoto => "social_photo",
        };
        write!(f, "{}", s)
    }
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Store `file` and return an opaque URL for it
    async fn upload(&self, file: Vec<u8>, owner: OwnerId, kind: ImageKind) -> Result<String, SyncError>;
}

/// Keeps uploads in memory under content-addressed URLs
#[derive(Debug)]
pub struct MemoryImageStore {
    base_url: String,
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            images: Mutex::new(HashMap::new()),
        }
    }

    /// Bytes previously uploaded under `url`
    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.images.lock().await.get(url).cloned()
    }
}

#[async_trait]
impl ImageUploader for MemoryImageStore {
    async fn upload(&self, file: Vec<u8>, owner: OwnerId, kind: ImageKind) -> Result<String, SyncError> {
        if file.is_empty() {
            return Err(ValidationFault::new(kind.target(), "file", "image is empty").into());
        }

        let digest = Sha256::digest(&file);
        let hash: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
        let url = format!("{}/{}/{}/{}", self.base_url, owner, kind, hash);

        self.images.lock().await.insert(url.clone(), file);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_upload_is_content_addressed() {
        let store = MemoryImageStore::new("memory://images/");
        let owner = Uuid::new_v4();

        let first = store.upload(b"png".to_vec(), owner, ImageKind::Avatar).await.unwrap();
        let second = store.upload(b"png".to_vec(), owner, ImageKind::Avatar).await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(&format!("memory://images/{}/avatar/", owner)));
        assert_eq!(store.get(&first).await, Some(b"png".to_vec()));

        let other = store.upload(b"jpg".to_vec(), owner, ImageKind::Avatar).await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let store = MemoryImageStore::new("memory://images");
        let err = store
            .upload(Vec::new(), Uuid::new_v4(), ImageKind::SocialPhoto)
            .await
            .unwrap_err();
        assert_eq!(err.target(), Target::Collection(Collection::SocialLinks));
    }
}
