use async_trait::async_trait;
use url::Url;

use crate::error::FetchError;

/// Unauthenticated HTTP fetch for modules that live outside origin storage.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    async fn fetch_text(&self, url: &Url) -> Result<String, FetchError>;
}
