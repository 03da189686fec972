#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use oscar_core::error::ToolError;
use oscar_core::pipeline::{ImportTarget, ModuleGraph};
use oscar_core::runtime::memory::{InMemoryFetcher, InMemoryMetadata, InMemoryStorage};
use oscar_core::runtime::{Bundler, SourceSyntax, StoredObject, Transpiler};
use oscar_core::{
    AutocompleteResolver, BuildCache, BundlePipeline, ExternalRule, ExternalizationPolicy,
    ImportDispatcher, Origin, ServeOptions, StorageLayout, TranspilePipeline, VersionResolver,
};

pub const PUBLIC_BASE: &str = "https://cdn.test/";
pub const STORAGE_BASE: &str = "https://storage.test/bucket";

/// Prefixes the source with a marker and counts invocations.
#[derive(Default)]
pub struct CountingTranspiler {
    calls: AtomicUsize,
}

impl CountingTranspiler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transpiler for CountingTranspiler {
    async fn transpile(&self, source: &str, syntax: SourceSyntax) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("// transpiled from {}\n{}", syntax.loader(), source))
    }
}

/// Concatenates the graph dependencies-first. Inlined imports are blanked,
/// external ones are kept as written.
#[derive(Default)]
pub struct ConcatBundler {
    calls: AtomicUsize,
}

impl ConcatBundler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bundler for ConcatBundler {
    async fn bundle(&self, graph: &ModuleGraph) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = String::new();
        for module in graph.modules.iter().rev() {
            out.push_str(&format!("// module {}\n", module.url));
            out.push_str(&module.rewrite_imports(|import| match &import.target {
                ImportTarget::Module(_) => Some("#inlined".to_string()),
                ImportTarget::External(spec) => Some(spec.clone()),
            }));
            out.push('\n');
        }
        Ok(out)
    }
}

/// Fails every build with a tool error.
pub struct FailingTool;

#[async_trait]
impl Transpiler for FailingTool {
    async fn transpile(&self, _source: &str, _syntax: SourceSyntax) -> Result<String, ToolError> {
        Err(ToolError::Failed("unexpected token".into()))
    }
}

#[async_trait]
impl Bundler for FailingTool {
    async fn bundle(&self, _graph: &ModuleGraph) -> Result<String, ToolError> {
        Err(ToolError::Failed("could not link".into()))
    }
}

/// Never finishes within any reasonable build timeout.
pub struct StalledTool;

#[async_trait]
impl Transpiler for StalledTool {
    async fn transpile(&self, _source: &str, _syntax: SourceSyntax) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

#[async_trait]
impl Bundler for StalledTool {
    async fn bundle(&self, _graph: &ModuleGraph) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// Overrides for the build side of a [`Fixture`]; unset fields keep the
/// counting tools, a 5 s timeout and the default module cap.
#[derive(Default)]
pub struct Tools {
    pub transpiler: Option<Arc<dyn Transpiler>>,
    pub bundler: Option<Arc<dyn Bundler>>,
    pub timeout: Option<Duration>,
    pub max_modules: Option<usize>,
}

/// A fully wired dispatcher over in-memory collaborators.
pub struct Fixture {
    pub metadata: InMemoryMetadata,
    pub storage: InMemoryStorage,
    pub layout: StorageLayout,
    pub transpiler: Arc<CountingTranspiler>,
    pub bundler: Arc<ConcatBundler>,
    pub dispatcher: ImportDispatcher,
    pub autocomplete: AutocompleteResolver,
}

impl Fixture {
    pub fn new(metadata: InMemoryMetadata) -> Self {
        Self::with_fetcher(metadata, InMemoryFetcher::new())
    }

    pub fn with_fetcher(metadata: InMemoryMetadata, fetcher: InMemoryFetcher) -> Self {
        Self::with_tools(metadata, fetcher, Tools::default())
    }

    pub fn with_tools(metadata: InMemoryMetadata, fetcher: InMemoryFetcher, tools: Tools) -> Self {
        let storage = InMemoryStorage::new();
        let layout = StorageLayout::new(STORAGE_BASE).unwrap();
        let public_base = Url::parse(PUBLIC_BASE).unwrap();
        let transpiler = Arc::new(CountingTranspiler::default());
        let bundler = Arc::new(ConcatBundler::default());

        let resolver = VersionResolver::new(Arc::new(metadata.clone()));
        let origin = Origin::new(Arc::new(storage.clone()), layout.clone());
        let cache = BuildCache::new(Arc::new(storage.clone()), layout.clone());
        let policy = ExternalizationPolicy::new(vec![ExternalRule::package(
            public_base.clone(),
            "@acme/context",
        )]);

        let timeout = tools.timeout.unwrap_or(Duration::from_secs(5));
        let transpile = TranspilePipeline::new(
            cache.clone(),
            origin.clone(),
            tools.transpiler.unwrap_or_else(|| transpiler.clone() as Arc<dyn Transpiler>),
            timeout,
        );
        let mut bundle = BundlePipeline::new(
            cache,
            origin.clone(),
            resolver.clone(),
            Arc::new(fetcher),
            tools.bundler.unwrap_or_else(|| bundler.clone() as Arc<dyn Bundler>),
            policy,
            public_base,
            timeout,
        );
        if let Some(max_modules) = tools.max_modules {
            bundle = bundle.with_max_modules(max_modules);
        }
        let dispatcher = ImportDispatcher::new(
            resolver.clone(),
            origin,
            transpile,
            bundle,
            ServeOptions::default(),
        );

        Self {
            metadata,
            storage,
            layout,
            transpiler,
            bundler,
            dispatcher,
            autocomplete: AutocompleteResolver::new(resolver),
        }
    }

    /// Put a raw package file into origin storage.
    pub fn put_file(&self, scope: &str, package_at: &str, path: &str, code: &str) {
        let url = self.layout.file_url(scope, package_at, path);
        self.storage.insert(&url, StoredObject::new(code.to_string(), None));
    }

    pub fn put_typed_file(&self, scope: &str, package_at: &str, path: &str, body: &str, content_type: &str) {
        let url = self.layout.file_url(scope, package_at, path);
        self.storage
            .insert(&url, StoredObject::new(body.to_string(), Some(content_type)));
    }
}

/// `acme/widgets` at 1.2.0, 1.3.0 and 2.0.0.
pub fn widgets() -> InMemoryMetadata {
    InMemoryMetadata::new().with_package("acme", "widgets", &["1.2.0", "1.3.0", "2.0.0"])
}
