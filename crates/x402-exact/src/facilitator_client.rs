use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

pub use crate::facilitator::DEFAULT_FACILITATOR_URL;
use crate::{
    facilitator::Facilitator,
    transport::{FacilitatorRequest, SettleResponse, SupportedResponse, VerifyResponse},
};

/// A remote facilitator client that communicates over HTTP.
///
/// Endpoints are resolved relative to `base_url`, so `https://x402.org/facilitator` verifies
/// at `https://x402.org/facilitator/verify`.
#[derive(Debug, Clone)]
pub struct RemoteFacilitatorClient {
    pub base_url: Url,
    pub client: reqwest::Client,
    pub supported_headers: HeaderMap,
    pub verify_headers: HeaderMap,
    pub settle_headers: HeaderMap,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteFacilitatorClientError {
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("HTTP request error: {0}")]
    HttpRequestError(#[from] reqwest::Error),
    #[error("Facilitator {endpoint} returned {status}: {body}")]
    UnexpectedStatus {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },
}

impl RemoteFacilitatorClient {
    pub fn from_url(base_url: Url) -> Self {
        RemoteFacilitatorClient::with_base(Self::directory_url(base_url))
    }

    pub fn from_str_url(base_url: &str) -> Result<Self, RemoteFacilitatorClientError> {
        Ok(RemoteFacilitatorClient::from_url(Url::parse(base_url)?))
    }

    fn with_base(base_url: Url) -> Self {
        RemoteFacilitatorClient {
            base_url,
            client: reqwest::Client::new(),
            supported_headers: HeaderMap::new(),
            verify_headers: HeaderMap::new(),
            settle_headers: HeaderMap::new(),
        }
    }

    fn directory_url(mut url: Url) -> Url {
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.supported_headers.insert(key, value.to_owned());
        self.verify_headers.insert(key, value.to_owned());
        self.settle_headers.insert(key, value.to_owned());
        self
    }

    pub fn supported_header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.supported_headers.insert(key, value.to_owned());
        self
    }

    pub fn verify_header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.verify_headers.insert(key, value.to_owned());
        self
    }

    pub fn settle_header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.settle_headers.insert(key, value.to_owned());
        self
    }

    async fn read<T: DeserializeOwned>(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<T, RemoteFacilitatorClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            #[cfg(feature = "tracing")]
            tracing::warn!(endpoint, %status, "Facilitator request failed");
            return Err(RemoteFacilitatorClientError::UnexpectedStatus {
                endpoint,
                status,
                body,
            });
        }
        Ok(response.json().await?)
    }
}

impl Facilitator for RemoteFacilitatorClient {
    type Error = RemoteFacilitatorClientError;

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        let response = self
            .client
            .get(self.base_url.join("supported")?)
            .headers(self.supported_headers.clone())
            .send()
            .await?;

        Self::read("supported", response).await
    }

    async fn verify(&self, request: FacilitatorRequest) -> Result<VerifyResponse, Self::Error> {
        let response = self
            .client
            .post(self.base_url.join("verify")?)
            .headers(self.verify_headers.clone())
            .json(&request)
            .send()
            .await?;

        Self::read("verify", response).await
    }

    async fn settle(&self, request: FacilitatorRequest) -> Result<SettleResponse, Self::Error> {
        let response = self
            .client
            .post(self.base_url.join("settle")?)
            .headers(self.settle_headers.clone())
            .json(&request)
            .send()
            .await?;

        Self::read("settle", response).await
    }
}
