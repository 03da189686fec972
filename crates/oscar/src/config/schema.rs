//! Configuration schema for the oscar server
//!
//! Every section is `#[serde(default)]`, so a config file only needs the
//! settings that differ from the defaults. Secrets are normally supplied
//! through the environment rather than the file.

use oscar_core::dispatch::{DEFAULT_ARTIFACT_MAX_AGE, DEFAULT_REDIRECT_MAX_AGE, DEFAULT_RUNTIME_MARKER};
use oscar_core::pipeline::bundle::DEFAULT_MAX_MODULES;
use oscar_core::resolver::DEFAULT_MAX_PAGES;
use oscar_core::ExternalRule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Environment variables that override file settings.
pub const ENV_GRAPHQL_ENDPOINT: &str = "OSCAR_GRAPHQL_ENDPOINT";
pub const ENV_GRAPHQL_TOKEN: &str = "OSCAR_GRAPHQL_TOKEN";
pub const ENV_BUCKET: &str = "OSCAR_BUCKET";
pub const ENV_STORAGE_TOKEN: &str = "OSCAR_STORAGE_TOKEN";
pub const ENV_PUBLIC_URL: &str = "OSCAR_PUBLIC_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OscarConfig {
    pub server: ServerConfig,
    pub metadata: MetadataConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub build: BuildConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
    /// Packages left as runtime imports in bundles.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub externals: Vec<ExternalRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Base URL clients reach this service at; bundle graphs treat imports
    /// under it as packages in origin storage.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            public_url: "http://localhost:8000/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// GraphQL endpoint URL
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub page_size: u32,
    pub max_pages: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: None,
            page_size: 100,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_url: String,
    pub bucket: String,
    /// Static bearer token. Without one, `metadata_server` decides between
    /// instance credentials and anonymous access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub metadata_server: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: "https://storage.googleapis.com".to_string(),
            bucket: String::new(),
            token: None,
            metadata_server: false,
        }
    }
}

impl StorageConfig {
    /// `{base_url}/{bucket}`, the root every object URL hangs off.
    pub fn root_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket.trim_matches('/')
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds; applies to raw files and built artifacts.
    pub artifact_max_age: u64,
    /// Seconds; applies to redirects to a canonical version.
    pub redirect_max_age: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            artifact_max_age: DEFAULT_ARTIFACT_MAX_AGE,
            redirect_max_age: DEFAULT_REDIRECT_MAX_AGE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub esbuild: PathBuf,
    pub target: String,
    pub timeout_secs: u64,
    pub max_modules: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            esbuild: PathBuf::from("esbuild"),
            target: "es2020".to_string(),
            timeout_secs: 60,
            max_modules: DEFAULT_MAX_MODULES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User-Agent substring of clients that get raw TypeScript.
    pub runtime_marker: String,
    /// Timeout for every outbound HTTP request.
    pub http_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            runtime_marker: DEFAULT_RUNTIME_MARKER.to_string(),
            http_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a daily-rotated log file in addition to stderr.
    pub file: bool,
    /// Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            directory: None,
        }
    }
}

impl OscarConfig {
    /// Apply `OSCAR_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_GRAPHQL_ENDPOINT) {
            self.metadata.endpoint = endpoint;
        }
        if let Some(token) = lookup(ENV_GRAPHQL_TOKEN) {
            self.metadata.token = Some(token);
        }
        if let Some(bucket) = lookup(ENV_BUCKET) {
            self.storage.bucket = bucket;
        }
        if let Some(token) = lookup(ENV_STORAGE_TOKEN) {
            self.storage.token = Some(token);
        }
        if let Some(url) = lookup(ENV_PUBLIC_URL) {
            self.server.public_url = url;
        }
    }

    /// Validate the configuration for common errors
    ///
    /// Returns Ok(()) if valid, or Err with a list of error messages
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.metadata.endpoint.is_empty() {
            errors.push(format!("metadata.endpoint is required (or set {ENV_GRAPHQL_ENDPOINT})"));
        } else if let Err(e) = Url::parse(&self.metadata.endpoint) {
            errors.push(format!("metadata.endpoint is not a URL: {e}"));
        }
        if self.metadata.page_size == 0 {
            errors.push("metadata.page_size must be at least 1".to_string());
        }
        if self.metadata.max_pages == 0 {
            errors.push("metadata.max_pages must be at least 1".to_string());
        }

        if self.storage.bucket.is_empty() {
            errors.push(format!("storage.bucket is required (or set {ENV_BUCKET})"));
        }
        if let Err(e) = Url::parse(&self.storage.base_url) {
            errors.push(format!("storage.base_url is not a URL: {e}"));
        }

        match Url::parse(&self.server.public_url) {
            Ok(url) if url.cannot_be_a_base() => {
                errors.push("server.public_url cannot be used as a base URL".to_string())
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("server.public_url is not a URL: {e}")),
        }

        if self.build.target.is_empty() {
            errors.push("build.target must not be empty".to_string());
        }
        if self.build.timeout_secs == 0 {
            errors.push("build.timeout_secs must be at least 1".to_string());
        }
        if self.build.max_modules == 0 {
            errors.push("build.max_modules must be at least 1".to_string());
        }
        if self.client.http_timeout_secs == 0 {
            errors.push("client.http_timeout_secs must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Public base URL with a trailing slash, so relative joins stay under it.
    pub fn public_base(&self) -> Result<Url, url::ParseError> {
        let raw = &self.server.public_url;
        if raw.ends_with('/') {
            Url::parse(raw)
        } else {
            Url::parse(&format!("{raw}/"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> OscarConfig {
        let mut config = OscarConfig::default();
        config.metadata.endpoint = "https://api.test/graphql".to_string();
        config.storage.bucket = "modules".to_string();
        config
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: OscarConfig = toml::from_str(
            r#"
[metadata]
endpoint = "https://api.test/graphql"

[storage]
bucket = "modules"

[[externals]]
base = "https://cdn.test/"
package = "@acme/context"
"#,
        )
        .unwrap();

        assert_eq!(config.metadata.page_size, 100);
        assert_eq!(config.cache.artifact_max_age, 691_200);
        assert_eq!(config.cache.redirect_max_age, 300);
        assert_eq!(config.client.runtime_marker, "deno");
        assert_eq!(config.externals.len(), 1);
        assert_eq!(config.externals[0].package.as_deref(), Some("@acme/context"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config: OscarConfig = toml::from_str(include_str!("../../../../oscar.toml")).unwrap();
        assert!(config.storage.metadata_server);
        assert_eq!(config.externals[0].package.as_deref(), Some("@oscar/context"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = OscarConfig::default();
        config.build.timeout_secs = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("metadata.endpoint"));
        assert!(errors[1].contains("storage.bucket"));
        assert!(errors[2].contains("build.timeout_secs"));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = valid();
        config.apply_overrides(|key| match key {
            ENV_GRAPHQL_TOKEN => Some("secret".to_string()),
            ENV_BUCKET => Some("other-bucket".to_string()),
            _ => None,
        });
        assert_eq!(config.metadata.token.as_deref(), Some("secret"));
        assert_eq!(config.storage.bucket, "other-bucket");
        assert_eq!(config.metadata.endpoint, "https://api.test/graphql");
    }

    #[test]
    fn test_storage_root_and_public_base() {
        let mut config = valid();
        config.storage.base_url = "https://storage.googleapis.com/".to_string();
        config.server.public_url = "https://cdn.test".to_string();
        assert_eq!(config.storage.root_url(), "https://storage.googleapis.com/modules");
        assert_eq!(config.public_base().unwrap().as_str(), "https://cdn.test/");
    }
}
