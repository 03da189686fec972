//! Object storage over authenticated HTTP (GCS XML API style).

use async_trait::async_trait;
use oscar_core::error::StorageError;
use oscar_core::runtime::{OriginStorage, StoredObject};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

/// GCE/GKE instance metadata endpoint for the default service account.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens for storage requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// `None` means send the request unauthenticated.
    async fn token(&self) -> Result<Option<String>, StorageError>;
}

/// A fixed token, or anonymous access.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
    expires_in: u64,
}

/// Short-lived tokens from the instance metadata server, cached until
/// shortly before they expire.
pub struct MetadataServerToken {
    client: reqwest::Client,
    url: String,
    cached: Mutex<Option<(String, Instant)>>,
}

impl MetadataServerToken {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(client, METADATA_TOKEN_URL)
    }

    pub fn with_url(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<AccessToken, StorageError> {
        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| StorageError::Credentials(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StorageError::Credentials(format!(
                "metadata server returned {}",
                response.status()
            )));
        }
        response
            .json::<AccessToken>()
            .await
            .map_err(|e| StorageError::Credentials(e.to_string()))
    }
}

#[async_trait]
impl TokenSource for MetadataServerToken {
    async fn token(&self) -> Result<Option<String>, StorageError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < *expires_at {
                return Ok(Some(token.clone()));
            }
        }

        let fresh = self.fetch().await?;
        debug!(expires_in = fresh.expires_in, "Refreshed storage access token");
        let expires_at = Instant::now() + Duration::from_secs(fresh.expires_in);
        *cached = Some((fresh.access_token.clone(), expires_at));
        Ok(Some(fresh.access_token))
    }
}

/// `OriginStorage` backed by plain `GET`/`PUT` on object URLs.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl HttpObjectStorage {
    pub fn new(client: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self { client, tokens }
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, StorageError> {
        Ok(match self.tokens.token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

fn status_error(status: StatusCode, url: &Url) -> StorageError {
    StorageError::Status {
        status: status.as_u16(),
        url: url.to_string(),
    }
}

#[async_trait]
impl OriginStorage for HttpObjectStorage {
    #[instrument(skip(self), fields(url = %url))]
    async fn get(&self, url: &Url) -> Result<Option<StoredObject>, StorageError> {
        let request = self.authorize(self.client.get(url.clone())).await?;
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Object not found");
                Ok(None)
            }
            status if status.is_success() => {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| StorageError::Transport(e.to_string()))?;
                Ok(Some(StoredObject {
                    bytes,
                    content_type,
                }))
            }
            status => Err(status_error(status, url)),
        }
    }

    #[instrument(skip(self, object), fields(url = %url, bytes = object.bytes.len()))]
    async fn put(&self, url: &Url, object: StoredObject) -> Result<(), StorageError> {
        let mut request = self.client.put(url.clone()).body(object.bytes);
        if let Some(content_type) = &object.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response.status(), url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken(None).token().await.unwrap(), None);
        assert_eq!(
            StaticToken(Some("t".into())).token().await.unwrap().as_deref(),
            Some("t")
        );
    }

    #[test]
    fn test_access_token_shape() {
        let token: AccessToken =
            serde_json::from_str(r#"{"access_token":"ya29","expires_in":3599,"token_type":"Bearer"}"#)
                .unwrap();
        assert_eq!(token.access_token, "ya29");
        assert_eq!(token.expires_in, 3599);
    }

    #[tokio::test]
    async fn test_unreachable_metadata_server_is_credentials_error() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let source = MetadataServerToken::with_url(client, "http://127.0.0.1:9/token");
        assert!(matches!(source.token().await, Err(StorageError::Credentials(_))));
    }
}
