//! In-memory implementations of the runtime traits.
//!
//! Used by the test suites of both crates and handy for running the pipeline
//! without any network access.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use super::fetch::ModuleFetcher;
use super::metadata::{MetadataSource, PackagePage, PackageVersionRecord, VersionPage};
use super::storage::{OriginStorage, StoredObject};
use crate::error::{FetchError, MetadataError, StorageError};

/// Metadata source backed by a map, served in fixed-size pages.
#[derive(Clone)]
pub struct InMemoryMetadata {
    page_size: usize,
    // scope -> package -> versions
    scopes: Arc<Mutex<BTreeMap<String, BTreeMap<String, Vec<PackageVersionRecord>>>>>,
    failure: Arc<Mutex<Option<MetadataError>>>,
    omit_cursors: Arc<AtomicBool>,
    page_calls: Arc<AtomicUsize>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            scopes: Arc::new(Mutex::new(BTreeMap::new())),
            failure: Arc::new(Mutex::new(None)),
            omit_cursors: Arc::new(AtomicBool::new(false)),
            page_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Register a scope that has no packages yet.
    pub fn with_scope(self, scope: &str) -> Self {
        self.scopes
            .lock()
            .unwrap()
            .entry(scope.to_string())
            .or_default();
        self
    }

    /// Register a package whose versions carry no module files.
    pub fn with_package(self, scope: &str, name: &str, versions: &[&str]) -> Self {
        let records = versions
            .iter()
            .map(|v| PackageVersionRecord::new(*v))
            .collect();
        self.with_records(scope, name, records)
    }

    pub fn with_records(self, scope: &str, name: &str, records: Vec<PackageVersionRecord>) -> Self {
        self.scopes
            .lock()
            .unwrap()
            .entry(scope.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .extend(records);
        self
    }

    /// Make every subsequent page request fail with `error`.
    pub fn fail_with(&self, error: MetadataError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Keep reporting `has_more` but stop handing out continuation cursors,
    /// like a misbehaving upstream.
    pub fn omit_cursors(&self) {
        self.omit_cursors.store(true, Ordering::SeqCst);
    }

    /// Number of page requests served so far.
    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    fn page<T: Clone>(&self, items: &[T], cursor: Option<&str>) -> Result<(Vec<T>, Option<String>, bool), MetadataError> {
        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| MetadataError::Decode(format!("bad cursor {c}")))?,
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        let slice = items.get(start..end).unwrap_or_default().to_vec();
        let has_more = end < items.len();
        let next = (has_more && !self.omit_cursors.load(Ordering::SeqCst)).then(|| end.to_string());
        Ok((slice, next, has_more))
    }

    fn check_failure(&self) -> Result<(), MetadataError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataSource for InMemoryMetadata {
    async fn version_page(
        &self,
        scope: &str,
        name: &str,
        cursor: Option<&str>,
    ) -> Result<VersionPage, MetadataError> {
        self.check_failure()?;
        let scopes = self.scopes.lock().unwrap();
        let Some(records) = scopes.get(scope).and_then(|pkgs| pkgs.get(name)) else {
            return Ok(VersionPage::default());
        };
        let (versions, next_cursor, has_more) = self.page(records, cursor)?;
        Ok(VersionPage {
            package_exists: true,
            versions,
            next_cursor,
            has_more,
        })
    }

    async fn package_page(
        &self,
        scope: &str,
        cursor: Option<&str>,
    ) -> Result<PackagePage, MetadataError> {
        self.check_failure()?;
        let scopes = self.scopes.lock().unwrap();
        let Some(packages) = scopes.get(scope) else {
            return Ok(PackagePage::default());
        };
        let slugs: Vec<String> = packages.keys().cloned().collect();
        let (slugs, next_cursor, has_more) = self.page(&slugs, cursor)?;
        Ok(PackagePage {
            scope_exists: true,
            slugs,
            next_cursor,
            has_more,
        })
    }
}

/// Object storage backed by a map keyed by URL.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    fail_puts: Arc<AtomicBool>,
    gets: Arc<AtomicUsize>,
    puts: Arc<AtomicUsize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &Url, object: StoredObject) {
        self.objects
            .lock()
            .unwrap()
            .insert(url.to_string(), object);
    }

    pub fn object(&self, url: &Url) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(url.as_str()).cloned()
    }

    /// Make every subsequent `put` fail.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginStorage for InMemoryStorage {
    async fn get(&self, url: &Url) -> Result<Option<StoredObject>, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.object(url))
    }

    async fn put(&self, url: &Url, object: StoredObject) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        self.insert(url, object);
        Ok(())
    }
}

/// Module fetcher serving fixed texts by URL.
#[derive(Clone, Default)]
pub struct InMemoryFetcher {
    modules: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(self, url: &str, code: &str) -> Self {
        self.modules
            .lock()
            .unwrap()
            .insert(url.to_string(), code.to_string());
        self
    }
}

#[async_trait]
impl ModuleFetcher for InMemoryFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        self.modules
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}
