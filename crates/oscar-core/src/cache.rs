//! Cache-aside storage for built artifacts.
//!
//! Artifacts live in the same object store as the package sources, under a
//! `.cache/{strategy}` prefix of the package directory. Writes are plain
//! overwrites: there is no locking and the last writer wins, which is fine
//! because builds are deterministic.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::OscarError;
use crate::runtime::{OriginStorage, StoredObject};

/// Maps package files and cache keys to object-storage URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    base: Url,
}

impl StorageLayout {
    /// `base` is the bucket root, e.g. `https://storage.googleapis.com/my-bucket`.
    pub fn new(base: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn object_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was ruled out in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    /// URL of a raw package file.
    pub fn file_url(&self, scope: &str, package_at: &str, path: &str) -> Url {
        let scope = format!("@{scope}");
        self.object_url(
            [scope.as_str(), package_at]
                .into_iter()
                .chain(path.split('/')),
        )
    }

    pub fn cache_url(&self, key: &CacheKey) -> Url {
        let scope = format!("@{}", key.scope);
        self.object_url(
            [
                scope.as_str(),
                key.package.as_str(),
                ".cache",
                key.strategy.namespace(),
            ]
            .into_iter()
            .chain(key.path.split('/')),
        )
    }
}

/// Which build produced an artifact. Each strategy has its own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStrategy {
    Transpile,
    Bundle,
}

impl BuildStrategy {
    pub fn namespace(&self) -> &'static str {
        match self {
            BuildStrategy::Transpile => "transpiled",
            BuildStrategy::Bundle => "bundled",
        }
    }
}

/// `(scope, package@version, logical path)` in one strategy's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: String,
    pub package: String,
    pub path: String,
    pub strategy: BuildStrategy,
}

impl CacheKey {
    pub fn new(
        strategy: BuildStrategy,
        scope: impl Into<String>,
        package: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            package: package.into(),
            path: path.into(),
            strategy,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{}/{}/.cache/{}/{}",
            self.scope,
            self.package,
            self.strategy.namespace(),
            self.path
        )
    }
}

/// Cache-aside wrapper over origin storage.
#[derive(Clone)]
pub struct BuildCache {
    storage: Arc<dyn OriginStorage>,
    layout: StorageLayout,
}

impl BuildCache {
    pub fn new(storage: Arc<dyn OriginStorage>, layout: StorageLayout) -> Self {
        Self { storage, layout }
    }

    /// Look up an artifact. A failing probe is logged and reported as a miss.
    pub async fn probe(&self, key: &CacheKey) -> Option<StoredObject> {
        let url = self.layout.cache_url(key);
        debug!(%key, %url, "Probing build cache");
        match self.storage.get(&url).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(%key, error = %e, "Cache probe failed, treating as miss");
                None
            }
        }
    }

    pub async fn store(&self, key: &CacheKey, artifact: StoredObject) -> Result<(), OscarError> {
        let url = self.layout.cache_url(key);
        debug!(%key, %url, bytes = artifact.bytes.len(), "Storing artifact");
        self.storage
            .put(&url, artifact)
            .await
            .map_err(OscarError::CacheStore)
    }
}
