//! Byte fetching for icons and preview images

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::config::FaviconConfig;
use crate::utils::{NetworkError, Result};

/// Raw response for one candidate URL
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResource {
    pub status: u16,
    /// Declared `Content-Type`, if any
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResource {
    pub fn ok(content_type: Option<&str>, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: content_type.map(str::to_string),
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }
}

/// Fetches candidate image URLs
///
/// `max_bytes` lets implementations stop reading early; callers still
/// validate the returned body length.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        max_bytes: usize,
    ) -> std::result::Result<FetchedResource, NetworkError>;
}

/// `reqwest`-backed fetcher
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(config: &FaviconConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(
        &self,
        url: &str,
        max_bytes: usize,
    ) -> std::result::Result<FetchedResource, NetworkError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Ok(FetchedResource::status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(length) = response.content_length() {
            if length as usize > max_bytes {
                return Err(NetworkError::TooLarge {
                    size: length as usize,
                    limit: max_bytes,
                });
            }
        }

        // Servers may omit or lie about Content-Length
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > max_bytes {
                return Err(NetworkError::TooLarge {
                    size: body.len(),
                    limit: max_bytes,
                });
            }
        }

        Ok(FetchedResource {
            status,
            content_type,
            body,
        })
    }
}

/// In-memory fetcher serving a fixed URL table; anything else is a 404
///
/// Used for offline sessions. Every request is recorded so callers can see
/// which candidates were tried.
#[derive(Default)]
pub struct StaticFetcher {
    responses:
        std::collections::HashMap<String, std::result::Result<FetchedResource, NetworkError>>,
    delay: Option<std::time::Duration>,
    calls: std::sync::Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `resource` for `url`
    pub fn with(mut self, url: impl Into<String>, resource: FetchedResource) -> Self {
        self.responses.insert(url.into(), Ok(resource));
        self
    }

    /// Fail requests for `url` with `error`
    pub fn with_error(mut self, url: impl Into<String>, error: NetworkError) -> Self {
        self.responses.insert(url.into(), Err(error));
        self
    }

    /// Delay every response, simulating network latency
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs requested so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch(
        &self,
        url: &str,
        _max_bytes: usize,
    ) -> std::result::Result<FetchedResource, NetworkError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.responses.get(url) {
            Some(response) => response.clone(),
            None => Ok(FetchedResource::status(404)),
        }
    }
}
