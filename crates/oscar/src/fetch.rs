use async_trait::async_trait;
use oscar_core::error::FetchError;
use oscar_core::runtime::ModuleFetcher;
use tracing::instrument;
use url::Url;

/// Native module fetcher using reqwest
#[derive(Clone)]
pub struct HttpModuleFetcher {
    client: reqwest::Client,
}

impl HttpModuleFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ModuleFetcher for HttpModuleFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url.clone()).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(transport)
    }
}
