//! Network access for the worker.
//!
//! ### The `Network` seam
//! - The worker only ever talks to the network through [`Network`], so tests
//!   and embedders can substitute their own transport.
//! - A rejected fetch (offline, DNS, refused connection) is `Error::Network`;
//!   an HTTP error status is still a response.
//!
//! ### Response classification
//! - Same origin as the configured origin: `basic`
//! - Cross-origin `no-cors` request: `opaque`
//! - Any other cross-origin response: `cors`

pub mod url;

use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, is_same_origin};

use swcache_core::{AppConfig, Error, Request, RequestMode, Response, ResponseKind};

/// Something that can perform a request.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Errors mean no response arrived at all.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// The worker's origin, used to classify responses.
    pub origin: ::url::Url,

    pub user_agent: String,
    /// Bodies larger than this fail with `Error::TooLarge`.
    pub max_bytes: usize,
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = ::url::Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            origin,
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
        })
    }
}

/// reqwest-backed [`Network`].
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new transport with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn classify(&self, request: &Request, final_url: &::url::Url) -> ResponseKind {
        if is_same_origin(final_url, &self.config.origin) {
            ResponseKind::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseKind::Opaque
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("bad method {}: {e}", request.method)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("network error: {e}")))?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::TooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let status = response.status();
        let final_url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| *name != header::SET_COOKIE)
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::TooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let kind = self.classify(request, &final_url);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            final_url = %final_url,
            status = status.as_u16(),
            kind = kind.as_str(),
            elapsed_ms,
            bytes = bytes.len(),
            "network fetch complete"
        );

        Ok(Response { url: final_url.to_string(), status: status.as_u16(), headers, body: bytes.to_vec(), kind })
    }
}
