use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

use crate::cache::StorageLayout;
use crate::error::OscarError;
use crate::runtime::{OriginStorage, StoredObject};

/// Read access to raw package files in origin storage.
#[derive(Clone)]
pub struct Origin {
    storage: Arc<dyn OriginStorage>,
    layout: StorageLayout,
}

impl Origin {
    pub fn new(storage: Arc<dyn OriginStorage>, layout: StorageLayout) -> Self {
        Self { storage, layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn storage(&self) -> &Arc<dyn OriginStorage> {
        &self.storage
    }

    pub fn file_url(&self, scope: &str, package_at: &str, path: &str) -> Url {
        self.layout.file_url(scope, package_at, path)
    }

    /// Fetch a package file. A missing object is `FileNotFound`.
    pub async fn read(&self, scope: &str, package_at: &str, path: &str) -> Result<StoredObject, OscarError> {
        let url = self.file_url(scope, package_at, path);
        debug!(%url, "Reading origin file");
        match self.storage.get(&url).await {
            Ok(Some(object)) => Ok(object),
            Ok(None) => Err(OscarError::FileNotFound),
            Err(e) => {
                error!(%url, error = %e, "Origin fetch failed");
                Err(OscarError::OriginFetch(e))
            }
        }
    }
}

/// Content type for a package file served untransformed.
///
/// Source dialects get the types a module-loading runtime expects; the rest
/// is guessed from the extension.
pub fn content_type_for_path(path: &str) -> String {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("ts") | Some("mts") => "application/typescript".to_string(),
        Some("tsx") => "text/tsx".to_string(),
        Some("jsx") => "text/jsx".to_string(),
        Some("js") | Some("mjs") => "application/javascript".to_string(),
        _ => mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}
