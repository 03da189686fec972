use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// One file published as part of a package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFile {
    pub filename: String,
    pub code: String,
}

/// A published version as reported by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersionRecord {
    pub semver: String,
    #[serde(default)]
    pub module_files: Vec<ModuleFile>,
}

impl PackageVersionRecord {
    pub fn new(semver: impl Into<String>) -> Self {
        Self {
            semver: semver.into(),
            module_files: Vec::new(),
        }
    }
}

/// One page of a package's version list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionPage {
    /// False when the scope or the package does not exist at all.
    pub package_exists: bool,
    pub versions: Vec<PackageVersionRecord>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// One page of a scope's package slugs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagePage {
    pub scope_exists: bool,
    pub slugs: Vec<String>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Cursor-paginated package metadata.
///
/// Implementations must be Send + Sync; a single instance is shared by every
/// in-flight request.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch one page of versions for `scope/name`, starting after `cursor`.
    async fn version_page(
        &self,
        scope: &str,
        name: &str,
        cursor: Option<&str>,
    ) -> Result<VersionPage, MetadataError>;

    /// Fetch one page of package slugs under `scope`, starting after `cursor`.
    async fn package_page(
        &self,
        scope: &str,
        cursor: Option<&str>,
    ) -> Result<PackagePage, MetadataError>;
}
