use semver::Version;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::imports::{replace_self_url, scan_imports};
use super::policy::ExternalizationPolicy;
use super::{Artifact, BuildTarget, GraphModule, ImportTarget, ModuleGraph, ResolvedImport, JAVASCRIPT};
use crate::cache::{BuildCache, BuildStrategy, CacheKey};
use crate::error::OscarError;
use crate::origin::Origin;
use crate::resolver::VersionResolver;
use crate::runtime::{Bundler, ModuleFetcher, StoredObject};
use crate::specifier::{decode_path, encode_path, PackageSpecifier};

/// Default cap on modules pulled into one bundle.
pub const DEFAULT_MAX_MODULES: usize = 512;

/// Whole-graph build: walk imports from the entry file, then link.
#[derive(Clone)]
pub struct BundlePipeline {
    cache: BuildCache,
    origin: Origin,
    resolver: VersionResolver,
    fetcher: Arc<dyn ModuleFetcher>,
    bundler: Arc<dyn Bundler>,
    policy: ExternalizationPolicy,
    public_base: Url,
    max_modules: usize,
    timeout: Duration,
}

impl BundlePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: BuildCache,
        origin: Origin,
        resolver: VersionResolver,
        fetcher: Arc<dyn ModuleFetcher>,
        bundler: Arc<dyn Bundler>,
        policy: ExternalizationPolicy,
        public_base: Url,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            origin,
            resolver,
            fetcher,
            bundler,
            policy,
            public_base,
            max_modules: DEFAULT_MAX_MODULES,
            timeout,
        }
    }

    pub fn with_max_modules(mut self, max_modules: usize) -> Self {
        self.max_modules = max_modules.max(1);
        self
    }

    pub fn cache_key(target: &BuildTarget) -> CacheKey {
        CacheKey::new(
            BuildStrategy::Bundle,
            target.scope.clone(),
            target.package_at(),
            target.path.clone(),
        )
    }

    /// Public URL of the target file, used as the graph entry.
    pub fn entry_url(&self, target: &BuildTarget) -> Result<Url, OscarError> {
        let relative = format!("@{}/{}/{}", target.scope, target.package_at(), encode_path(&target.path));
        self.public_base
            .join(&relative)
            .map_err(|e| OscarError::Bundle(format!("cannot build entry URL: {e}")))
    }

    #[instrument(skip(self), fields(scope = %target.scope, package = %target.package_at(), path = %target.path))]
    pub async fn build(&self, target: &BuildTarget) -> Result<Artifact, OscarError> {
        let key = Self::cache_key(target);
        if let Some(hit) = self.cache.probe(&key).await {
            debug!(%key, "Serving bundle from cache");
            return Ok(Artifact {
                bytes: hit.bytes,
                from_cache: true,
            });
        }

        let entry = self.entry_url(target)?;
        let graph = self.collect_graph(entry).await?;
        info!(%key, modules = graph.modules.len(), externals = graph.externals().len(), "Bundling");

        let code = tokio::time::timeout(self.timeout, self.bundler.bundle(&graph))
            .await
            .map_err(|_| OscarError::Bundle(format!("bundler timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| OscarError::Bundle(e.to_string()))?;

        let object = StoredObject::new(code, Some(JAVASCRIPT));
        if let Err(e) = self.cache.store(&key, object.clone()).await {
            warn!(%key, error = %e, "Could not store bundle, serving uncached");
        }

        Ok(Artifact {
            bytes: object.bytes,
            from_cache: false,
        })
    }

    /// Breadth-first walk from `entry`, loading every non-external import once.
    ///
    /// Imports of this service's own packages are pinned to their resolved
    /// version first, so one file reached through different ranges is a
    /// single module.
    pub async fn collect_graph(&self, entry: Url) -> Result<ModuleGraph, OscarError> {
        let mut queue = VecDeque::from([entry.clone()]);
        let mut seen = HashSet::from([entry.to_string()]);
        let mut pinned = HashMap::new();
        let mut modules = Vec::new();

        while let Some(url) = queue.pop_front() {
            if modules.len() >= self.max_modules {
                return Err(OscarError::Bundle(format!(
                    "module graph exceeds {} modules",
                    self.max_modules
                )));
            }

            let code = self.load(&url).await?;
            let mut imports = Vec::new();
            for found in scan_imports(&code) {
                let target = match self.resolve(&found.specifier, &url)? {
                    ImportTarget::Module(dep) => ImportTarget::Module(self.pin(dep, &mut pinned).await?),
                    external => external,
                };
                if let ImportTarget::Module(dep) = &target {
                    if seen.insert(dep.to_string()) {
                        queue.push_back(dep.clone());
                    }
                }
                imports.push(ResolvedImport {
                    specifier: found.specifier,
                    span: found.span,
                    target,
                });
            }
            modules.push(GraphModule { url, code, imports });
        }

        Ok(ModuleGraph { entry, modules })
    }

    /// Rewrite an own-package URL to its canonical exact-version form.
    /// Other URLs pass through. `pinned` memoizes range resolution per walk.
    async fn pin(&self, url: Url, pinned: &mut HashMap<String, Version>) -> Result<Url, OscarError> {
        let Some(spec) = self.own_specifier(&url) else {
            return Ok(url);
        };
        let memo = format!("{}/{}@{}", spec.scope, spec.name, spec.range);
        let version = match pinned.get(&memo) {
            Some(version) => version.clone(),
            None => {
                let version = self.own_version(&spec).await?;
                pinned.insert(memo, version.clone());
                version
            }
        };
        self.public_base
            .join(spec.canonical_path(&version).trim_start_matches('/'))
            .map_err(|e| OscarError::Bundle(format!("cannot pin {spec}: {e}")))
    }

    /// Resolution hook: where `specifier` imported from `importer` points.
    pub fn resolve(&self, specifier: &str, importer: &Url) -> Result<ImportTarget, OscarError> {
        let target = self
            .policy
            .resolve(specifier, importer)
            .map_err(OscarError::Bundle)?;
        debug!(%specifier, %importer, ?target, "Resolved import");
        Ok(target)
    }

    /// Load hook: module text with self-URL references made literal.
    pub async fn load(&self, url: &Url) -> Result<String, OscarError> {
        let raw = match self.own_specifier(url) {
            Some(spec) => self.load_own(&spec).await?,
            None => self
                .fetcher
                .fetch_text(url)
                .await
                .map_err(|e| OscarError::Bundle(e.to_string()))?,
        };
        Ok(replace_self_url(&raw, url.as_str()))
    }

    /// The package specifier for URLs served by this service, with the
    /// URL's percent-encoding undone.
    fn own_specifier(&self, url: &Url) -> Option<PackageSpecifier> {
        let rest = url.as_str().strip_prefix(self.public_base.as_str())?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);
        PackageSpecifier::parse_str(&decode_path(rest)?).ok()
    }

    async fn own_version(&self, spec: &PackageSpecifier) -> Result<Version, OscarError> {
        if let Ok(version) = Version::parse(spec.range.as_str()) {
            return Ok(version);
        }
        self.resolver
            .resolve(&spec.scope, &spec.name, &spec.range)
            .await
            .map(|resolution| resolution.version)
            .map_err(|e| OscarError::Bundle(format!("cannot resolve {spec}: {e}")))
    }

    async fn load_own(&self, spec: &PackageSpecifier) -> Result<String, OscarError> {
        let version = self.own_version(spec).await?;
        let object = self
            .origin
            .read(&spec.scope, &spec.package_at(&version), &spec.path)
            .await
            .map_err(|e| OscarError::Bundle(format!("cannot load {spec}: {e}")))?;
        Ok(object.text())
    }
}
