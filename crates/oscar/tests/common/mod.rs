#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use oscar::AppState;
use oscar_core::error::ToolError;
use oscar_core::pipeline::ModuleGraph;
use oscar_core::runtime::memory::{InMemoryFetcher, InMemoryMetadata, InMemoryStorage};
use oscar_core::runtime::metadata::{ModuleFile, PackageVersionRecord};
use oscar_core::runtime::{Bundler, SourceSyntax, StoredObject, Transpiler};
use oscar_core::{
    AutocompleteResolver, BuildCache, BundlePipeline, ExternalizationPolicy, ImportDispatcher,
    Origin, ServeOptions, StorageLayout, TranspilePipeline, VersionResolver,
};

pub const STORAGE_BASE: &str = "https://storage.test/bucket";

pub struct MarkingTranspiler;

#[async_trait]
impl Transpiler for MarkingTranspiler {
    async fn transpile(&self, source: &str, syntax: SourceSyntax) -> Result<String, ToolError> {
        Ok(format!("// {}\n{}", syntax.loader(), source))
    }
}

pub struct JoiningBundler;

#[async_trait]
impl Bundler for JoiningBundler {
    async fn bundle(&self, graph: &ModuleGraph) -> Result<String, ToolError> {
        Ok(graph
            .modules
            .iter()
            .map(|m| m.code.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn record(semver: &str, files: &[&str]) -> PackageVersionRecord {
    PackageVersionRecord {
        semver: semver.to_string(),
        module_files: files
            .iter()
            .map(|f| ModuleFile {
                filename: f.to_string(),
                code: String::new(),
            })
            .collect(),
    }
}

/// Scope `acme` with `widgets` (1.2.0, 1.3.0, 2.0.0), `widgets-core` and `other`.
pub fn registry() -> InMemoryMetadata {
    InMemoryMetadata::new()
        .with_records(
            "acme",
            "widgets",
            vec![
                record("1.2.0", &["/mod.ts"]),
                record("1.3.0", &["/mod.ts", "/README.md"]),
                record("2.0.0", &["/mod.ts"]),
            ],
        )
        .with_package("acme", "widgets-core", &["0.1.0"])
        .with_package("acme", "other", &["1.0.0"])
}

/// A running server over in-memory collaborators.
pub struct TestServer {
    pub addr: SocketAddr,
    pub metadata: InMemoryMetadata,
    pub storage: InMemoryStorage,
    pub layout: StorageLayout,
    pub client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(metadata: InMemoryMetadata) -> Self {
        let storage = InMemoryStorage::new();
        let layout = StorageLayout::new(STORAGE_BASE).unwrap();
        let resolver = VersionResolver::new(Arc::new(metadata.clone()));
        let origin = Origin::new(Arc::new(storage.clone()), layout.clone());
        let cache = BuildCache::new(Arc::new(storage.clone()), layout.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let public_base = Url::parse(&format!("http://{addr}/")).unwrap();

        let transpile = TranspilePipeline::new(
            cache.clone(),
            origin.clone(),
            Arc::new(MarkingTranspiler),
            Duration::from_secs(5),
        );
        let bundle = BundlePipeline::new(
            cache,
            origin.clone(),
            resolver.clone(),
            Arc::new(InMemoryFetcher::new()),
            Arc::new(JoiningBundler),
            ExternalizationPolicy::default(),
            public_base,
            Duration::from_secs(5),
        );
        let state = AppState::new(
            ImportDispatcher::new(
                resolver.clone(),
                origin,
                transpile,
                bundle,
                ServeOptions::default(),
            ),
            AutocompleteResolver::new(resolver),
        );

        let app = oscar::router(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            addr,
            metadata,
            storage,
            layout,
            client,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn get_as(&self, path: &str, user_agent: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .unwrap()
    }

    pub fn put_file(&self, scope: &str, package_at: &str, path: &str, code: &str) {
        let url = self.layout.file_url(scope, package_at, path);
        self.storage.insert(&url, StoredObject::new(code.to_string(), None));
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
