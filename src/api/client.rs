use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::types::{ApiErrorBody, NewsQuery, NewsResponse};

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Error bodies are only read for their `message`
const MAX_ERROR_BODY_SIZE: usize = 64 * 1024;

/// Path of the paginated news endpoint, relative to the base URL
const NEWS_PATH: &str = "news";

/// Errors from a single request to the news endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connect, TLS or mid-body transport failure
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),
    /// The transport gave up waiting
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code, and the server's `message` if it sent one
    #[error("Server error: status {status}")]
    HttpStatus {
        status: u16,
        message: Option<String>,
    },
    /// The response body was not a valid news payload
    #[error("Malformed response: {0}")]
    Decode(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// The caller's cancellation token fired before the request finished
    #[error("Request cancelled")]
    Cancelled,
    /// The configured base URL cannot be used
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::NetworkUnreachable(err.to_string())
        }
    }
}

/// Remote feed of news pages.
///
/// Implementations must resolve promptly with [`FetchError::Cancelled`]
/// once `cancel` fires.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_page(
        &self,
        query: &NewsQuery,
        cancel: &CancellationToken,
    ) -> Result<NewsResponse, FetchError>;
}

/// HTTP implementation of [`NewsSource`] for `GET /news`.
pub struct NewsClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl NewsClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<SecretString>,
    ) -> Result<Self, FetchError> {
        // Trailing slash so join() appends instead of replacing the last segment
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        match base_url.scheme() {
            "https" => {}
            "http" => {
                let is_local = matches!(
                    base_url.host_str(),
                    Some("localhost") | Some("127.0.0.1") | Some("10.0.2.2")
                );
                if api_key.is_some() && !is_local {
                    tracing::warn!(base_url = %base_url, "Sending API key over plain HTTP");
                }
            }
            other => {
                return Err(FetchError::InvalidUrl(format!(
                    "unsupported scheme '{other}'"
                )))
            }
        }

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Full request URL for `query`. The API key is appended last.
    fn endpoint(&self, query: &NewsQuery) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join(NEWS_PATH)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query.to_pairs() {
                pairs.append_pair(name, &value);
            }
            if let Some(key) = &self.api_key {
                pairs.append_pair("apikey", key.expose_secret());
            }
        }
        Ok(url)
    }

    async fn request(&self, url: Url, query: &NewsQuery) -> Result<NewsResponse, FetchError> {
        tracing::debug!(page = ?query.page, size = query.page_size(), "GET /news");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = read_limited_bytes(response, MAX_ERROR_BODY_SIZE)
                .await
                .ok()
                .and_then(|body| server_message(&body));
            tracing::warn!(
                status = %status,
                page = ?query.page,
                message = ?message,
                "News endpoint returned error status"
            );
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NewsSource for NewsClient {
    async fn fetch_page(
        &self,
        query: &NewsQuery,
        cancel: &CancellationToken,
    ) -> Result<NewsResponse, FetchError> {
        let url = self.endpoint(query)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.request(url, query) => result,
        }
    }
}

/// `message` from a JSON error body, if there is a non-blank one.
fn server_message(body: &[u8]) -> Option<String> {
    let parsed: ApiErrorBody = serde_json::from_slice(body).ok()?;
    parsed
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::from_reqwest)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
