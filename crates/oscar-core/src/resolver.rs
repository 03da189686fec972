//! Resolve a version range against the paginated metadata source.

use semver::Version;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{MetadataError, ResolveError};
use crate::range::VersionRange;
use crate::runtime::{MetadataSource, PackageVersionRecord};

/// Default cap on metadata pages fetched for a single package.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// The valid versions of one package, in upstream order.
#[derive(Debug, Clone, Default)]
pub struct PackageVersions {
    entries: Vec<(Version, PackageVersionRecord)>,
}

impl PackageVersions {
    /// Keep only records whose semver string is strictly valid.
    ///
    /// When the same version appears twice the first record wins.
    pub fn from_records(records: impl IntoIterator<Item = PackageVersionRecord>) -> Self {
        let mut entries: Vec<(Version, PackageVersionRecord)> = Vec::new();
        for record in records {
            match Version::parse(&record.semver) {
                Ok(version) if !entries.iter().any(|(v, _)| *v == version) => {
                    entries.push((version, record))
                }
                Ok(_) => debug!(semver = %record.semver, "Skipping duplicate version"),
                Err(e) => debug!(semver = %record.semver, error = %e, "Skipping invalid version"),
            }
        }
        Self { entries }
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.entries.iter().map(|(v, _)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_satisfying(&self, range: &VersionRange) -> Option<&Version> {
        range.max_satisfying(self.versions())
    }

    pub fn latest(&self) -> Option<&Version> {
        self.versions().max()
    }

    pub fn record(&self, version: &Version) -> Option<&PackageVersionRecord> {
        self.entries
            .iter()
            .find(|(v, _)| v == version)
            .map(|(_, record)| record)
    }
}

/// A successful resolution: the chosen version plus everything it was chosen from.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub version: Version,
    pub versions: PackageVersions,
}

impl Resolution {
    pub fn record(&self) -> Option<&PackageVersionRecord> {
        self.versions.record(&self.version)
    }
}

/// Resolves ranges by walking every metadata page for a package.
///
/// Pages of one package are fetched strictly in sequence because each
/// cursor comes from the previous response. Nothing is cached between
/// calls; separate resolutions may run concurrently.
#[derive(Clone)]
pub struct VersionResolver {
    source: Arc<dyn MetadataSource>,
    max_pages: usize,
}

impl VersionResolver {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn source(&self) -> &Arc<dyn MetadataSource> {
        &self.source
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Accumulate every valid version of `scope/name`.
    #[instrument(skip(self), fields(scope = %scope, name = %name))]
    pub async fn fetch_versions(&self, scope: &str, name: &str) -> Result<PackageVersions, ResolveError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        for page_no in 0..self.max_pages {
            let page = self
                .source
                .version_page(scope, name, cursor.as_deref())
                .await?;

            if !page.package_exists {
                debug!("Package does not exist upstream");
                return Err(ResolveError::PackageNotFound);
            }

            debug!(page = page_no, count = page.versions.len(), "Fetched version page");
            records.extend(page.versions);

            if !page.has_more {
                return Ok(PackageVersions::from_records(records));
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Err(MetadataError::MissingCursor.into()),
            }
        }

        warn!(max_pages = self.max_pages, "Version listing exceeded page cap");
        Err(MetadataError::TooManyPages(self.max_pages).into())
    }

    /// Pick the highest version of `scope/name` satisfying `range`.
    pub async fn resolve(
        &self,
        scope: &str,
        name: &str,
        range: &VersionRange,
    ) -> Result<Resolution, ResolveError> {
        let versions = self.fetch_versions(scope, name).await?;
        Self::choose(versions, range)
    }

    /// Pick from an already fetched listing.
    pub fn choose(versions: PackageVersions, range: &VersionRange) -> Result<Resolution, ResolveError> {
        let version = versions
            .max_satisfying(range)
            .cloned()
            .ok_or(ResolveError::VersionNotFound)?;
        debug!(%range, %version, "Resolved version");
        Ok(Resolution { version, versions })
    }
}
