//! Per-source fetch front end: timeout, SSL toggle and retry budget in one place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::config::HttpConfig;
use crate::error::{ImportError, Result};
use crate::fetch::{FetchError, Fetcher, Request, default_fetcher};
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Fetch settings owned by one importer instance.
#[derive(Clone)]
pub struct SourceClient {
    provider: &'static str,
    fetcher: Arc<dyn Fetcher>,
    retry: RetryPolicy,
    timeout: Duration,
    verify_ssl: bool,
}

impl fmt::Debug for SourceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceClient")
            .field("provider", &self.provider)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("verify_ssl", &self.verify_ssl)
            .finish_non_exhaustive()
    }
}

impl SourceClient {
    /// Client with the default HTTP fetcher and [`HttpConfig::default`].
    pub fn new(provider: &'static str) -> Self {
        Self::with_fetcher(provider, default_fetcher())
    }

    pub fn with_fetcher(provider: &'static str, fetcher: Arc<dyn Fetcher>) -> Self {
        let http = HttpConfig::default();
        Self {
            provider,
            fetcher,
            retry: http.retry_policy(),
            timeout: http.timeout(),
            verify_ssl: http.verify_ssl,
        }
    }

    pub fn http_config(mut self, http: &HttpConfig) -> Self {
        self.retry = http.retry_policy();
        self.timeout = http.timeout();
        self.verify_ssl = http.verify_ssl;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn verifies_ssl(&self) -> bool {
        self.verify_ssl
    }

    fn prepare(&self, mut request: Request) -> Request {
        if request.timeout.is_none() {
            request.timeout = Some(self.timeout);
        }
        request.verify_ssl = request.verify_ssl && self.verify_ssl;
        request
    }

    /// Fetch with retries, keeping the raw [`FetchError`] on failure.
    ///
    /// For callers that walk several candidate URLs and treat a miss as
    /// "try the next one".
    pub fn try_fetch(&self, request: Request) -> std::result::Result<Vec<u8>, FetchError> {
        let request = self.prepare(request);
        let label = format!("{} {}", self.provider, request.url);
        retry_with_backoff(&label, &self.retry, || self.fetcher.fetch(&request))
    }

    /// Fetch with retries; failures become [`ImportError::SourceUnavailable`].
    pub fn fetch(&self, request: Request) -> Result<Vec<u8>> {
        let url = request.full_url();
        log::debug!("{}: GET {url}", self.provider);
        self.try_fetch(request).map_err(|e| {
            ImportError::unavailable(
                self.provider,
                format!("{url}: {e} (after {} attempts)", self.retry.attempts()),
            )
        })
    }

    /// Fetch and deserialize a JSON body. Parse failures are not retried.
    pub fn fetch_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let url = request.url.clone();
        let bytes = self.fetch(request)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ImportError::format(self.provider, format!("invalid JSON from {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<Vec<std::result::Result<Vec<u8>, FetchError>>>,
        seen: Mutex<Vec<Request>>,
    }

    impl Fetcher for Scripted {
        fn fetch(&self, request: &Request) -> std::result::Result<Vec<u8>, FetchError> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn scripted(responses: Vec<std::result::Result<Vec<u8>, FetchError>>) -> Arc<Scripted> {
        Arc::new(Scripted {
            responses: Mutex::new(responses),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn timeouts_become_source_unavailable() {
        let fetcher = scripted(vec![
            Err(FetchError::Timeout("u".into())),
            Err(FetchError::Timeout("u".into())),
        ]);
        let client = SourceClient::with_fetcher("Test", fetcher.clone())
            .retry(RetryPolicy::immediate(1));
        let err = client.fetch(Request::get("https://example.org/a")).unwrap_err();
        assert!(matches!(err, ImportError::SourceUnavailable { provider: "Test", .. }));
        assert_eq!(fetcher.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn applies_timeout_and_ssl_toggle() {
        let fetcher = scripted(vec![Ok(b"ok".to_vec())]);
        let client = SourceClient::with_fetcher("Test", fetcher.clone())
            .timeout(Duration::from_secs(7))
            .verify_ssl(false);
        client.fetch(Request::get("https://example.org")).unwrap();
        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen[0].timeout, Some(Duration::from_secs(7)));
        assert!(!seen[0].verify_ssl);
    }

    #[test]
    fn bad_json_is_data_format_and_not_retried() {
        let fetcher = scripted(vec![Ok(b"<html>".to_vec())]);
        let client = SourceClient::with_fetcher("Test", fetcher.clone())
            .retry(RetryPolicy::immediate(3));
        let err = client
            .fetch_json::<serde_json::Value>(Request::get("https://example.org"))
            .unwrap_err();
        assert!(matches!(err, ImportError::DataFormat { .. }));
        assert_eq!(fetcher.seen.lock().unwrap().len(), 1);
    }
}
