//! Shared test doubles for unit tests.

use crate::net::{HttpClient, HttpRequest, HttpResponse};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

struct Stub {
    method: String,
    path_fragment: String,
    status: u16,
    body: String,
}

/// An [`HttpClient`] that serves scripted responses and records every request,
/// so tests can assert which backend calls were (or were not) issued.
#[derive(Default)]
pub struct MockHttpClient {
    stubs: Mutex<Vec<Stub>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a response for requests whose URL contains `path_fragment`.
    /// Later stubs win over earlier ones, so a test can override a default.
    pub fn stub(&self, method: &str, path_fragment: &str, status: u16, body: &str) {
        self.stubs.lock().unwrap().push(Stub {
            method: method.to_string(),
            path_fragment: path_fragment.to_string(),
            status,
            body: body.to_string(),
        });
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of recorded requests whose URL contains `fragment`.
    pub fn requests_matching(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }

    pub fn last_request_body(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .and_then(|r| r.body.as_ref())
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = {
            let stubs = self.stubs.lock().unwrap();
            stubs
                .iter()
                .rev()
                .find(|s| s.method == request.method && request.url.contains(&s.path_fragment))
                .map(|s| HttpResponse {
                    status_code: s.status,
                    body: s.body.clone().into_bytes(),
                })
        };
        self.requests.lock().unwrap().push(request.clone());
        response.ok_or_else(|| anyhow::anyhow!("no stub for {} {}", request.method, request.url))
    }
}
