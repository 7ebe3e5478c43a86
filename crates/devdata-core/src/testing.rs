//! Counting mock fetcher for importer tests.
//!
//! Routes are matched in registration order against the request's full URL
//! (query string included); the first route whose pattern is a substring
//! wins. Unmatched requests answer HTTP 404.
//!
//! [`zip_bytes`] and [`xlsx_bytes`] build small archive and workbook payloads.

use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rust_xlsxwriter::Workbook;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::fetch::{FetchError, Fetcher, Request};

#[derive(Debug, Clone)]
pub enum MockResponse {
    Body(Vec<u8>),
    Status(u16),
    Timeout,
}

#[derive(Debug)]
struct Route {
    pattern: String,
    response: MockResponse,
}

#[derive(Debug, Default)]
pub struct MockFetcher {
    routes: Vec<Route>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            response: MockResponse::Body(body.into()),
        });
        self
    }

    pub fn on_status(mut self, pattern: &str, status: u16) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            response: MockResponse::Status(status),
        });
        self
    }

    pub fn on_timeout(mut self, pattern: &str) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            response: MockResponse::Timeout,
        });
        self
    }

    /// Total fetches issued.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fetches whose full URL contains `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.full_url().contains(pattern))
            .count()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        let url = request.full_url();
        let route = self.routes.iter().find(|r| url.contains(&r.pattern));
        match route.map(|r| &r.response) {
            Some(MockResponse::Body(body)) => Ok(body.clone()),
            Some(MockResponse::Status(status)) => Err(FetchError::Http {
                status: Some(*status),
                message: format!("mock status for {url}"),
            }),
            Some(MockResponse::Timeout) => Err(FetchError::Timeout(url)),
            None => Err(FetchError::Http {
                status: Some(404),
                message: format!("no mock route for {url}"),
            }),
        }
    }
}

/// In-memory zip archive with the given `(name, content)` entries.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("zip entry");
        zip.write_all(content.as_bytes()).expect("zip write");
    }
    zip.finish().expect("zip finish").into_inner()
}

/// Small xlsx workbook. Cells that parse as numbers are stored as numbers,
/// empty strings are left blank.
pub fn xlsx_bytes(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).expect("valid sheet name");
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let (r, c) = (r as u32, c as u16);
                match value.parse::<f64>() {
                    Ok(n) => sheet.write_number(r, c, n),
                    Err(_) => sheet.write_string(r, c, *value),
                }
                .expect("cell within sheet bounds");
            }
        }
    }
    workbook.save_to_buffer().expect("workbook serializes")
}
