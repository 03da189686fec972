//! Editor completions for the import-URL registry schema.

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{MetadataError, OscarError, ResolveError};
use crate::fuzzy::FuzzyMatcher;
use crate::range::VersionRange;
use crate::resolver::{PackageVersions, VersionResolver};

/// Most items a single completion list carries.
pub const COMPLETION_LIMIT: usize = 100;

/// Completion list in the registry protocol's shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub items: Vec<String>,
    pub is_incomplete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preselect: Option<String>,
}

impl Completion {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Every package slug of a scope, and whether the page cap cut it short.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopePackages {
    pub slugs: Vec<String>,
    pub truncated: bool,
}

#[derive(Clone)]
pub struct AutocompleteResolver {
    resolver: VersionResolver,
    matcher: FuzzyMatcher,
}

impl AutocompleteResolver {
    pub fn new(resolver: VersionResolver) -> Self {
        Self {
            resolver,
            matcher: FuzzyMatcher::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: FuzzyMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Walk every package page of `scope`. `None` when the scope is unknown.
    pub async fn fetch_packages(&self, scope: &str) -> Result<Option<ScopePackages>, MetadataError> {
        let source = self.resolver.source();
        let mut packages = ScopePackages::default();
        let mut cursor: Option<String> = None;

        for _ in 0..self.resolver.max_pages() {
            let page = source.package_page(scope, cursor.as_deref()).await?;
            if !page.scope_exists {
                return Ok(None);
            }
            packages.slugs.extend(page.slugs);
            if !page.has_more {
                return Ok(Some(packages));
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Err(MetadataError::MissingCursor),
            }
        }

        warn!(%scope, max_pages = self.resolver.max_pages(), "Package listing truncated at page cap");
        packages.truncated = true;
        Ok(Some(packages))
    }

    /// Bare slugs of `scope`.
    #[instrument(skip(self))]
    pub async fn list_packages(&self, scope: &str) -> Result<Completion, OscarError> {
        let Some(packages) = self.fetch_packages(scope).await.map_err(OscarError::UpstreamMetadata)? else {
            return Ok(Completion::empty());
        };
        Ok(Completion {
            items: packages.slugs,
            is_incomplete: packages.truncated,
            preselect: None,
        })
    }

    /// Fuzzy search of `scope`'s slugs, each suffixed with `@`.
    #[instrument(skip(self))]
    pub async fn search_packages(&self, scope: &str, partial: &str) -> Result<Completion, OscarError> {
        let Some(packages) = self.fetch_packages(scope).await.map_err(OscarError::UpstreamMetadata)? else {
            return Ok(Completion::empty());
        };

        let found = self
            .matcher
            .search(partial, packages.slugs.iter().map(String::as_str));
        debug!(matches = found.len(), "Searched packages");

        let preselect = found.first().map(|m| format!("{}@", m.candidate));
        let items: Vec<String> = found
            .iter()
            .take(COMPLETION_LIMIT)
            .map(|m| format!("{}@", m.candidate))
            .collect();
        Ok(Completion {
            is_incomplete: found.len() > items.len() || packages.truncated,
            items,
            preselect,
        })
    }

    /// Versions of `scope/package`, newest first, optionally filtered by a
    /// partially typed range.
    #[instrument(skip(self))]
    pub async fn list_versions(
        &self,
        scope: &str,
        package: &str,
        partial: Option<&str>,
    ) -> Result<Completion, OscarError> {
        let Some(versions) = self.versions_or_empty(scope, package).await? else {
            return Ok(Completion::empty());
        };

        let filter = VersionFilter::new(partial.unwrap_or_default());
        let mut matching: Vec<&Version> = versions.versions().filter(|v| filter.accepts(v)).collect();
        matching.sort_by(|a, b| b.cmp(a));

        Ok(Completion {
            items: matching.into_iter().map(completion_range).collect(),
            is_incomplete: false,
            preselect: versions.latest().map(completion_range),
        })
    }

    /// Files of the version that `version_or_range` resolves to.
    #[instrument(skip(self))]
    pub async fn list_files(
        &self,
        scope: &str,
        package: &str,
        version_or_range: &str,
    ) -> Result<Completion, OscarError> {
        let Ok(range) = VersionRange::parse(version_or_range) else {
            return Ok(Completion::empty());
        };
        let Some(versions) = self.versions_or_empty(scope, package).await? else {
            return Ok(Completion::empty());
        };
        let Ok(resolution) = VersionResolver::choose(versions, &range) else {
            return Ok(Completion::empty());
        };

        let items = resolution
            .record()
            .map(|record| {
                record
                    .module_files
                    .iter()
                    .map(|file| file.filename.trim_start_matches('/').to_string())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Completion {
            items,
            is_incomplete: false,
            preselect: None,
        })
    }

    async fn versions_or_empty(&self, scope: &str, package: &str) -> Result<Option<PackageVersions>, OscarError> {
        match self.resolver.fetch_versions(scope, package).await {
            Ok(versions) => Ok(Some(versions)),
            Err(ResolveError::Upstream(e)) => Err(OscarError::UpstreamMetadata(e)),
            Err(_) => Ok(None),
        }
    }
}

/// `^x.y.z` from 1.0.0 upwards, `~0.y.z` below.
fn completion_range(version: &Version) -> String {
    if version.major >= 1 {
        format!("^{version}")
    } else {
        format!("~{version}")
    }
}

/// A range filter that degrades to a text prefix while the range is still
/// being typed (`1.` or `^1.2.`).
enum VersionFilter {
    All,
    Range(VersionRange),
    Prefix(String),
}

impl VersionFilter {
    fn new(partial: &str) -> Self {
        let partial = partial.trim();
        if partial.is_empty() {
            return VersionFilter::All;
        }
        match VersionRange::parse(partial) {
            Ok(range) => VersionFilter::Range(range),
            Err(_) => VersionFilter::Prefix(
                partial
                    .trim_start_matches(['^', '~', '=', 'v'])
                    .to_string(),
            ),
        }
    }

    fn accepts(&self, version: &Version) -> bool {
        match self {
            VersionFilter::All => true,
            VersionFilter::Range(range) => range.matches(version),
            VersionFilter::Prefix(prefix) => version.to_string().starts_with(prefix.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_completion_range_prefix() {
        assert_eq!(completion_range(&v("1.3.0")), "^1.3.0");
        assert_eq!(completion_range(&v("0.4.1")), "~0.4.1");
    }

    #[test]
    fn test_filter_falls_back_to_prefix() {
        let filter = VersionFilter::new("1.");
        assert!(filter.accepts(&v("1.2.0")));
        assert!(!filter.accepts(&v("2.1.0")));

        let filter = VersionFilter::new("^1.2");
        assert!(filter.accepts(&v("1.9.0")));
        assert!(!filter.accepts(&v("2.0.0")));

        assert!(VersionFilter::new("").accepts(&v("0.0.1")));
    }

    #[test]
    fn test_completion_omits_missing_preselect() {
        let json = serde_json::to_value(Completion::empty()).unwrap();
        assert_eq!(json, serde_json::json!({"items": [], "isIncomplete": false}));
    }
}
