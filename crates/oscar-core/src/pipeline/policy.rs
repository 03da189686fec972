//! Which imports a bundle must leave external, and how specifiers resolve.

use serde::{Deserialize, Serialize};
use url::Url;

use super::ImportTarget;

/// One externalization rule: everything under `base`, optionally narrowed
/// to a single package such as `@acme/context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRule {
    pub base: Url,
    #[serde(default)]
    pub package: Option<String>,
}

impl ExternalRule {
    pub fn package(base: Url, package: impl Into<String>) -> Self {
        Self {
            base,
            package: Some(package.into()),
        }
    }

    fn matches(&self, url: &Url) -> bool {
        let base = self.base.as_str().trim_end_matches('/');
        let prefix = match &self.package {
            Some(package) => format!("{}/{}", base, package.trim_matches('/')),
            None => format!("{base}/"),
        };
        let Some(rest) = url.as_str().strip_prefix(&prefix) else {
            return false;
        };
        // `@acme/context` must not swallow `@acme/context-menu`
        self.package.is_none() || rest.is_empty() || rest.starts_with('@') || rest.starts_with('/')
    }
}

/// Packages that must be loaded once at runtime rather than inlined, so
/// that modules sharing state keep seeing a single instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalizationPolicy {
    rules: Vec<ExternalRule>,
}

impl ExternalizationPolicy {
    pub fn new(rules: Vec<ExternalRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ExternalRule] {
        &self.rules
    }

    pub fn is_external(&self, url: &Url) -> bool {
        self.rules.iter().any(|rule| rule.matches(url))
    }

    /// Resolve `specifier` as imported from `importer`.
    ///
    /// Absolute `http(s)` URLs are checked against the rules as they are;
    /// relative and root-relative paths are joined onto the importer first.
    /// Bare specifiers and other schemes stay external, verbatim.
    pub fn resolve(&self, specifier: &str, importer: &Url) -> Result<ImportTarget, String> {
        let url = if is_path_like(specifier) {
            importer
                .join(specifier)
                .map_err(|e| format!("cannot resolve '{specifier}' from {importer}: {e}"))?
        } else {
            match Url::parse(specifier) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => url,
                _ => return Ok(ImportTarget::External(specifier.to_string())),
            }
        };

        if self.is_external(&url) {
            Ok(ImportTarget::External(url.to_string()))
        } else {
            Ok(ImportTarget::Module(url))
        }
    }
}

fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}
