use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{Artifact, BuildTarget, JAVASCRIPT};
use crate::cache::{BuildCache, BuildStrategy, CacheKey};
use crate::error::{OscarError, ToolError};
use crate::origin::Origin;
use crate::runtime::{SourceSyntax, StoredObject, Transpiler};

/// Single-file build: origin source through the transpiler, cached.
#[derive(Clone)]
pub struct TranspilePipeline {
    cache: BuildCache,
    origin: Origin,
    transpiler: Arc<dyn Transpiler>,
    timeout: Duration,
}

impl TranspilePipeline {
    pub fn new(
        cache: BuildCache,
        origin: Origin,
        transpiler: Arc<dyn Transpiler>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            origin,
            transpiler,
            timeout,
        }
    }

    pub fn cache_key(target: &BuildTarget) -> CacheKey {
        CacheKey::new(
            BuildStrategy::Transpile,
            target.scope.clone(),
            target.package_at(),
            target.path.clone(),
        )
    }

    #[instrument(skip(self), fields(scope = %target.scope, package = %target.package_at(), path = %target.path))]
    pub async fn build(&self, target: &BuildTarget) -> Result<Artifact, OscarError> {
        let key = Self::cache_key(target);
        if let Some(hit) = self.cache.probe(&key).await {
            debug!(%key, "Serving transpiled artifact from cache");
            return Ok(Artifact {
                bytes: hit.bytes,
                from_cache: true,
            });
        }

        let syntax = SourceSyntax::from_path(&target.path).ok_or_else(|| {
            OscarError::InvalidRequest(format!("{} is not a transpilable source file", target.path))
        })?;
        let source = self
            .origin
            .read(&target.scope, &target.package_at(), &target.path)
            .await?
            .text();

        info!(%key, "Transpiling");
        let code = tokio::time::timeout(self.timeout, self.transpiler.transpile(&source, syntax))
            .await
            .map_err(|_| OscarError::Transpile(ToolError::Timeout(self.timeout.as_secs())))?
            .map_err(OscarError::Transpile)?;

        let object = StoredObject::new(code, Some(JAVASCRIPT));
        if let Err(e) = self.cache.store(&key, object.clone()).await {
            warn!(%key, error = %e, "Could not store transpiled artifact, serving uncached");
        }

        Ok(Artifact {
            bytes: object.bytes,
            from_cache: false,
        })
    }
}
