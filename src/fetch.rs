use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the network capability.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A plain HTTP response: status code and body bytes.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network capability consumed by the signed-bundle stores.
///
/// The core only ever issues GET requests and never interprets anything
/// beyond status and body.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs an HTTP GET against `url`.
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Production fetcher backed by [`reqwest`].
#[derive(Debug, Default, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a default client configuration.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .to_vec();
        Ok(FetchResponse { status, body })
    }
}

/// An in-memory fetcher serving canned responses.
///
/// Meant for tests and offline operation; URLs with no configured response
/// fail with a transport error, which is exactly what an unreachable
/// endpoint would produce.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, FetchResponse>>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    /// Creates an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a 200 response for `url`.
    pub fn insert(&self, url: impl Into<String>, body: Vec<u8>) {
        self.insert_response(url, FetchResponse { status: 200, body });
    }

    /// Registers an arbitrary response for `url`.
    pub fn insert_response(&self, url: impl Into<String>, response: FetchResponse) {
        self.responses.lock().unwrap().insert(url.into(), response);
    }

    /// Number of GET requests served or refused so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Transport(format!("no response configured for {url}")))
    }
}
