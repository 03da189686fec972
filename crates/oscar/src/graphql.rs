//! Package metadata from the registry's GraphQL API.

use async_trait::async_trait;
use oscar_core::error::MetadataError;
use oscar_core::runtime::{MetadataSource, ModuleFile, PackagePage, PackageVersionRecord, VersionPage};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

pub const GET_PACKAGE_QUERY: &str = r#"
query GetPackage($orgSlug: String!, $packageSlug: String!, $first: Int, $after: String) {
  org(input: { slug: $orgSlug }) {
    package(slug: $packageSlug) {
      packageVersionConnection(first: $first, after: $after) {
        pageInfo {
          endCursor
          hasNextPage
        }
        nodes {
          semver
          moduleConnection {
            nodes {
              filename
              code
            }
          }
        }
      }
    }
  }
}
"#;

pub const LIST_PACKAGES_QUERY: &str = r#"
query ListPackages($orgSlug: String!, $first: Int, $after: String) {
  org(input: { slug: $orgSlug }) {
    packageConnection(first: $first, after: $after) {
      pageInfo {
        endCursor
        hasNextPage
      }
      nodes {
        slug
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    page_info: PageInfo,
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GetPackageData {
    org: Option<PackageOrg>,
}

#[derive(Debug, Deserialize)]
struct PackageOrg {
    package: Option<PackageNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageNode {
    package_version_connection: Connection<VersionNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionNode {
    semver: String,
    #[serde(default)]
    module_connection: Option<ModuleConnection>,
}

#[derive(Debug, Deserialize)]
struct ModuleConnection {
    nodes: Vec<ModuleFile>,
}

#[derive(Debug, Deserialize)]
struct ListPackagesData {
    org: Option<ScopeOrg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeOrg {
    package_connection: Connection<SlugNode>,
}

#[derive(Debug, Deserialize)]
struct SlugNode {
    slug: String,
}

impl From<GetPackageData> for VersionPage {
    fn from(data: GetPackageData) -> Self {
        let Some(package) = data.org.and_then(|org| org.package) else {
            return VersionPage::default();
        };
        let connection = package.package_version_connection;
        VersionPage {
            package_exists: true,
            versions: connection
                .nodes
                .into_iter()
                .map(|node| PackageVersionRecord {
                    semver: node.semver,
                    module_files: node.module_connection.map(|m| m.nodes).unwrap_or_default(),
                })
                .collect(),
            next_cursor: connection.page_info.end_cursor,
            has_more: connection.page_info.has_next_page,
        }
    }
}

impl From<ListPackagesData> for PackagePage {
    fn from(data: ListPackagesData) -> Self {
        let Some(org) = data.org else {
            return PackagePage::default();
        };
        let connection = org.package_connection;
        PackagePage {
            scope_exists: true,
            slugs: connection.nodes.into_iter().map(|n| n.slug).collect(),
            next_cursor: connection.page_info.end_cursor,
            has_more: connection.page_info.has_next_page,
        }
    }
}

/// Bearer-authenticated GraphQL client for package metadata.
#[derive(Clone)]
pub struct GraphQlMetadataSource {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    page_size: u32,
}

impl GraphQlMetadataSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, token: Option<String>, page_size: u32) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token,
            page_size,
        }
    }

    async fn request<T: DeserializeOwned>(&self, query: &str, variables: serde_json::Value) -> Result<T, MetadataError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MetadataError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Upstream(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MetadataError::Transport(e.to_string()))?;
        decode_response(&body)
    }
}

/// Unwrap a GraphQL envelope. Errors only fail the call when no data came back.
fn decode_response<T: DeserializeOwned>(body: &str) -> Result<T, MetadataError> {
    let envelope: GraphQlResponse<T> =
        serde_json::from_str(body).map_err(|e| MetadataError::Decode(e.to_string()))?;
    match envelope.data {
        Some(data) => Ok(data),
        None if !envelope.errors.is_empty() => Err(MetadataError::Upstream(
            envelope
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; "),
        )),
        None => Err(MetadataError::Decode("response carries no data".to_string())),
    }
}

#[async_trait]
impl MetadataSource for GraphQlMetadataSource {
    #[instrument(skip(self))]
    async fn version_page(&self, scope: &str, name: &str, cursor: Option<&str>) -> Result<VersionPage, MetadataError> {
        let data: GetPackageData = self
            .request(
                GET_PACKAGE_QUERY,
                json!({
                    "orgSlug": scope,
                    "packageSlug": name,
                    "first": self.page_size,
                    "after": cursor,
                }),
            )
            .await?;
        let page = VersionPage::from(data);
        debug!(count = page.versions.len(), has_more = page.has_more, "Fetched versions");
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn package_page(&self, scope: &str, cursor: Option<&str>) -> Result<PackagePage, MetadataError> {
        let data: ListPackagesData = self
            .request(
                LIST_PACKAGES_QUERY,
                json!({
                    "orgSlug": scope,
                    "first": self.page_size,
                    "after": cursor,
                }),
            )
            .await?;
        Ok(PackagePage::from(data))
    }
}
