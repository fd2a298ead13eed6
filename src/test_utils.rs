//! Test utilities for the import pipeline
//!
//! Scripted network responses, a sleeper that records instead of waiting and
//! small fixture builders, shared by unit tests and the `tests/` suites.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::infrastructure::http_client::{FetchError, FetchResponse, Fetcher};
use crate::infrastructure::timing::Sleeper;

/// [`Fetcher`] answering from per-URL queues of canned responses.
///
/// A URL whose queue is empty (or was never scripted) yields a transport
/// error, so a test that forgets to script a request fails loudly.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Result<FetchResponse, FetchError>>>>,
    requests: Mutex<Vec<String>>,
    sticky: Mutex<HashMap<String, Result<FetchResponse, FetchError>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, response: Result<FetchResponse, FetchError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn push_status(&self, url: &str, status: u16, body: &str) {
        self.push(url, Ok(response(status, body.as_bytes())));
    }

    pub fn push_bytes(&self, url: &str, status: u16, body: &[u8]) {
        self.push(url, Ok(response(status, body)));
    }

    pub fn push_transport_error(&self, url: &str, message: &str) {
        self.push(url, Err(FetchError::transport(url, message)));
    }

    /// Response returned for `url` every time once its queue is drained
    pub fn always(&self, url: &str, status: u16, body: &str) {
        self.sticky
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), Ok(response(status, body.as_bytes())));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }
}

fn response(status: u16, body: &[u8]) -> FetchResponse {
    FetchResponse { status, body: body.to_vec(), headers: Vec::new() }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        _extra_headers: &[(String, String)],
    ) -> Result<FetchResponse, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let queued = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        queued
            .or_else(|| {
                self.sticky
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(url)
                    .cloned()
            })
            .unwrap_or_else(|| Err(FetchError::transport(url, "no scripted response")))
    }
}

/// [`Sleeper`] that returns immediately and remembers every requested wait
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn total(&self) -> Duration {
        self.waits().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Minimal perfume page with OpenGraph image/description
pub fn perfume_page(og_image: &str, og_description: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta property="og:image" content="{og_image}">
  <meta property="og:description" content="{og_description}">
</head>
<body><h1>Perfume</h1></body>
</html>"#
    )
}

/// Header line plus rows joined with `;`
pub fn csv_document(header: &[&str], rows: &[&[&str]]) -> String {
    let mut out = header.join(";");
    out.push('\n');
    for row in rows {
        out.push_str(&row.join(";"));
        out.push('\n');
    }
    out
}
