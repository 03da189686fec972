use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::StorageError;

/// Bytes plus the content type the store reported for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl StoredObject {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Authenticated object storage addressed by URL.
///
/// Holds both the raw package files and the build cache.
#[async_trait]
pub trait OriginStorage: Send + Sync {
    /// Returns `Ok(None)` when the object does not exist.
    async fn get(&self, url: &Url) -> Result<Option<StoredObject>, StorageError>;

    /// Overwrites whatever is stored at `url`.
    async fn put(&self, url: &Url, object: StoredObject) -> Result<(), StorageError>;
}
