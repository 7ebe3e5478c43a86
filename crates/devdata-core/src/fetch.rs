//! Remote fetch adapter.
//!
//! Uses async reqwest internally on a shared tokio runtime but presents a
//! sync interface, so importers (and rayon workers) can call it directly.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout used when the caller does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("devdata/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single HTTP request description.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
    pub verify_ssl: bool,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            json: None,
            timeout: None,
            verify_ssl: true,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            json: Some(body),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    /// URL with the query string appended (used for logging and mock routing).
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let qs: Vec<String> = self.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}?{}", self.url, qs.join("&"))
    }
}

/// Error types for fetch operations
#[derive(Debug)]
pub enum FetchError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Request or body read exceeded its timeout
    Timeout(String),
    /// I/O error
    Io(io::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Timeout(url) => write!(f, "timed out: {url}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(e.url().map(|u| u.to_string()).unwrap_or_default());
        }
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            // No status means connect/reset errors; 429 and 5xx are transient
            Self::Http { status, .. } => matches!(status, None | Some(429) | Some(500..=599)),
            Self::Timeout(_) => true,
            Self::Io(e) => !matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Source of raw payload bytes.
///
/// Every importer goes through this trait, so tests can substitute a
/// counting mock for the network.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError>;
}

fn build_client(verify_ssl: bool) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(8)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!verify_ssl)
        .build()
        .expect("failed to build HTTP client")
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| build_client(true));

/// Client for the sources whose certificates do not validate.
static INSECURE_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| build_client(false));

/// Get shared HTTP client.
pub fn http_client(verify_ssl: bool) -> &'static reqwest::Client {
    if verify_ssl {
        &SHARED_CLIENT
    } else {
        &INSECURE_CLIENT
    }
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// [`Fetcher`] backed by the shared reqwest client.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let client = http_client(request.verify_ssl);
        let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }
        let builder = builder.timeout(timeout);

        let url = request.full_url();
        SHARED_RUNTIME.handle().block_on(async {
            let work = async {
                let response = builder
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| FetchError::from_reqwest(&e))?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::from_reqwest(&e))?;
                Ok::<_, FetchError>(bytes.to_vec())
            };
            // Outer guard in case the body stalls past the request timeout
            match tokio::time::timeout(timeout + Duration::from_secs(1), work).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(url)),
            }
        })
    }
}

/// Default fetcher shared by importers built with `new()`.
pub fn default_fetcher() -> Arc<dyn Fetcher> {
    Arc::new(HttpFetcher)
}

/// Read a local file in place of a download.
pub fn read_local(path: &Path) -> Result<Vec<u8>, FetchError> {
    std::fs::read(path).map_err(FetchError::Io)
}
