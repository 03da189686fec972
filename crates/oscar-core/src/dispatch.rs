//! The import request state machine: parse, resolve, canonicalize, classify, build.

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::error::{OscarError, ResolveError};
use crate::origin::{content_type_for_path, Origin};
use crate::pipeline::{BuildTarget, BundlePipeline, TranspilePipeline, JAVASCRIPT};
use crate::resolver::{PackageVersions, VersionResolver};
use crate::runtime::SourceSyntax;
use crate::specifier::PackageSpecifier;

/// Eight days, the lifetime of anything addressed by an exact version.
pub const DEFAULT_ARTIFACT_MAX_AGE: u64 = 8 * 24 * 60 * 60;
/// Lifetime of redirects to a canonical version.
pub const DEFAULT_REDIRECT_MAX_AGE: u64 = 300;
pub const DEFAULT_RUNTIME_MARKER: &str = "deno";

/// Response policy knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOptions {
    pub artifact_max_age: u64,
    pub redirect_max_age: u64,
    /// User-Agent substring identifying clients that compile TypeScript themselves.
    pub runtime_marker: String,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            artifact_max_age: DEFAULT_ARTIFACT_MAX_AGE,
            redirect_max_age: DEFAULT_REDIRECT_MAX_AGE,
            runtime_marker: DEFAULT_RUNTIME_MARKER.to_string(),
        }
    }
}

/// The raw pieces of an import request as they come off the route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRequest {
    pub scope: String,
    pub package: String,
    pub path: String,
    /// Query string without the leading `?`.
    pub query: Option<String>,
    pub user_agent: Option<String>,
}

impl ImportRequest {
    pub fn new(scope: impl Into<String>, package: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            package: package.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// True when `name` appears as a query key, with or without a value.
    pub fn has_flag(&self, name: &str) -> bool {
        self.query
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).any(|(k, _)| k == name))
            .unwrap_or(false)
    }
}

/// A transport-neutral response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    /// Public cache lifetime in seconds; `None` means do not cache.
    pub max_age: Option<u64>,
    pub location: Option<String>,
    pub body: Bytes,
}

impl Reply {
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8".to_string()),
            max_age: None,
            location: None,
            body: Bytes::from(body.into()),
        }
    }

    pub fn json(status: StatusCode, value: &impl Serialize) -> Self {
        let body = serde_json::to_vec_pretty(value).unwrap_or_default();
        Self {
            status,
            content_type: Some("application/json".to_string()),
            max_age: None,
            location: None,
            body: Bytes::from(body),
        }
    }

    pub fn bytes(body: Bytes, content_type: impl Into<String>, max_age: u64) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some(content_type.into()),
            max_age: Some(max_age),
            location: None,
            body,
        }
    }

    pub fn redirect(location: impl Into<String>, max_age: u64) -> Self {
        Self {
            status: StatusCode::FOUND,
            content_type: None,
            max_age: Some(max_age),
            location: Some(location.into()),
            body: Bytes::new(),
        }
    }

    pub fn cache_control(&self) -> Option<String> {
        self.max_age.map(|age| format!("public, max-age={age}"))
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl From<OscarError> for Reply {
    fn from(err: OscarError) -> Self {
        Reply::text(err.status(), err.to_string())
    }
}

/// One row of the diagnostic version table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionCheck {
    pub version: String,
    pub satisfies: bool,
}

/// Resolution details returned instead of content when `?debug` is set.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub scope: String,
    pub package: String,
    pub range: String,
    pub resolved: Option<String>,
    pub latest: Option<String>,
    pub versions: Vec<VersionCheck>,
    pub file_url: Option<String>,
    pub error: Option<String>,
}

/// Routes one import request to raw bytes, a redirect or a built artifact.
#[derive(Clone)]
pub struct ImportDispatcher {
    resolver: VersionResolver,
    origin: Origin,
    transpile: TranspilePipeline,
    bundle: BundlePipeline,
    options: ServeOptions,
}

impl ImportDispatcher {
    pub fn new(
        resolver: VersionResolver,
        origin: Origin,
        transpile: TranspilePipeline,
        bundle: BundlePipeline,
        options: ServeOptions,
    ) -> Self {
        Self {
            resolver,
            origin,
            transpile,
            bundle,
            options,
        }
    }

    pub fn options(&self) -> &ServeOptions {
        &self.options
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Handle a request; every failure becomes an error reply.
    pub async fn dispatch(&self, request: &ImportRequest) -> Reply {
        match self.try_dispatch(request).await {
            Ok(reply) => reply,
            Err(err) => {
                match &err {
                    OscarError::UpstreamMetadata(_) | OscarError::OriginFetch(_) => {
                        error!(scope = %request.scope, package = %request.package, error = %err, "Upstream failure")
                    }
                    _ => debug!(error = %err, "Request failed"),
                }
                err.into()
            }
        }
    }

    #[instrument(skip(self, request), fields(scope = %request.scope, package = %request.package, path = %request.path))]
    pub async fn try_dispatch(&self, request: &ImportRequest) -> Result<Reply, OscarError> {
        let spec = PackageSpecifier::parse(&request.scope, &request.package, &request.path)?;

        if request.has_flag("debug") {
            return self.diagnose(&spec).await;
        }

        let resolution = self
            .resolver
            .resolve(&spec.scope, &spec.name, &spec.range)
            .await?;
        let version = resolution.version;

        if spec.range.as_str() != version.to_string() {
            let mut location = spec.canonical_path(&version);
            if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
                location.push('?');
                location.push_str(query);
            }
            debug!(%location, "Redirecting to canonical version");
            return Ok(Reply::redirect(location, self.options.redirect_max_age));
        }

        let package_at = spec.package_at(&version);

        if self.is_runtime_client(request.user_agent.as_deref()) {
            let object = self.origin.read(&spec.scope, &package_at, &spec.path).await?;
            return Ok(Reply::bytes(
                object.bytes,
                content_type_for_path(&spec.path),
                self.options.artifact_max_age,
            ));
        }

        if SourceSyntax::from_path(&spec.path).is_none() {
            let object = self.origin.read(&spec.scope, &package_at, &spec.path).await?;
            let content_type = object
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for_path(&spec.path));
            return Ok(Reply::bytes(object.bytes, content_type, self.options.artifact_max_age));
        }

        let target = BuildTarget {
            scope: spec.scope,
            name: spec.name,
            version,
            path: spec.path,
        };
        let artifact = if request.has_flag("bundle") {
            self.bundle.build(&target).await?
        } else {
            self.transpile.build(&target).await?
        };
        Ok(Reply::bytes(artifact.bytes, JAVASCRIPT, self.options.artifact_max_age))
    }

    fn is_runtime_client(&self, user_agent: Option<&str>) -> bool {
        let marker = self.options.runtime_marker.to_ascii_lowercase();
        match user_agent {
            Some(ua) if !marker.is_empty() => ua.to_ascii_lowercase().contains(&marker),
            _ => false,
        }
    }

    /// Diagnostic JSON for `spec`. Not-found outcomes are reported in the
    /// body with a 200; upstream failures still fail the request.
    async fn diagnose(&self, spec: &PackageSpecifier) -> Result<Reply, OscarError> {
        let mut report = Diagnostics {
            scope: spec.scope.clone(),
            package: spec.name.clone(),
            range: spec.range.to_string(),
            ..Default::default()
        };

        match self.resolver.fetch_versions(&spec.scope, &spec.name).await {
            Ok(versions) => self.fill_diagnostics(&mut report, spec, versions),
            Err(ResolveError::Upstream(e)) => return Err(OscarError::UpstreamMetadata(e)),
            Err(e) => report.error = Some(e.to_string()),
        }
        Ok(Reply::json(StatusCode::OK, &report))
    }

    fn fill_diagnostics(&self, report: &mut Diagnostics, spec: &PackageSpecifier, versions: PackageVersions) {
        report.latest = versions.latest().map(|v| v.to_string());
        report.versions = versions
            .versions()
            .map(|v| VersionCheck {
                version: v.to_string(),
                satisfies: spec.range.matches(v),
            })
            .collect();
        match VersionResolver::choose(versions, &spec.range) {
            Ok(resolution) => {
                let url = self.origin.file_url(
                    &spec.scope,
                    &spec.package_at(&resolution.version),
                    &spec.path,
                );
                report.resolved = Some(resolution.version.to_string());
                report.file_url = Some(url.to_string());
            }
            Err(e) => report.error = Some(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_flags() {
        let req = ImportRequest::new("@acme", "widgets", "mod.ts").with_query("bundle&x=1");
        assert!(req.has_flag("bundle"));
        assert!(req.has_flag("x"));
        assert!(!req.has_flag("debug"));
        assert!(!ImportRequest::new("@a", "b", "c").has_flag("bundle"));
        assert!(ImportRequest::new("@a", "b", "c")
            .with_query("debug=true")
            .has_flag("debug"));
    }

    #[test]
    fn test_reply_from_error() {
        let reply: Reply = OscarError::FileNotFound.into();
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body_text(), "File not found");
        assert_eq!(reply.cache_control(), None);
    }

    #[test]
    fn test_redirect_reply() {
        let reply = Reply::redirect("/@acme/widgets@1.3.0/mod.ts", 300);
        assert_eq!(reply.status, StatusCode::FOUND);
        assert_eq!(reply.cache_control().as_deref(), Some("public, max-age=300"));
    }

    #[test]
    fn test_diagnostics_serialize_camel_case() {
        let report = Diagnostics {
            file_url: Some("https://storage.test/x".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fileUrl"], "https://storage.test/x");
        assert!(json["resolved"].is_null());
    }
}
