//! HTTP transport seam.
//!
//! The client speaks to the repository only through [`Transport`]: one blocking call per
//! request, returning the status, location header and body untouched. [`HttpTransport`] is the
//! production implementation over `reqwest`'s blocking client; tests substitute a recording fake.

use crate::config::GatewayConfig;
use crate::constants::{FHIR_JSON_MIME, REQUEST_ID_HEADER};
use crate::{GatewayError, GatewayResult};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_LOCATION, CONTENT_TYPE, LOCATION};
use uuid::Uuid;

/// Raw outcome of an HTTP exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// `Location` header, or `Content-Location` when no `Location` was sent.
    pub location: Option<String>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, location: Option<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            location,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read response from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Blocking request/response exchange with the repository.
///
/// Implementations must be safe to share across threads; the core issues concurrent requests
/// through a shared reference when callers submit measurements in parallel.
pub trait Transport: Send + Sync {
    /// POST a JSON document.
    fn post_json(&self, url: &str, body: String) -> Result<TransportResponse, TransportError>;

    /// GET with query parameters.
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest` blocking client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport using the configured timeout.
    pub fn new(cfg: &GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| GatewayError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<TransportResponse, TransportError> {
        let request_id = Uuid::new_v4();
        tracing::debug!(%url, %request_id, "sending request");

        let response = request
            .header(ACCEPT, FHIR_JSON_MIME)
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .send()
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let location = headers
            .get(LOCATION)
            .or_else(|| headers.get(CONTENT_LOCATION))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().map_err(|source| TransportError::Body {
            url: url.to_string(),
            source,
        })?;

        tracing::debug!(%url, %request_id, status, "received response");
        Ok(TransportResponse {
            status,
            location,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, url: &str, body: String) -> Result<TransportResponse, TransportError> {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FHIR_JSON_MIME)
            .body(body);
        self.send(url, request)
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse, TransportError> {
        let request = self.client.get(url).query(query);
        self.send(url, request)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) struct RecordedRequest {
        pub method: &'static str,
        pub url: String,
        pub body: Option<String>,
        pub query: Vec<(String, String)>,
    }

    /// Transport that replays queued responses and records every request.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, status: u16, location: Option<&str>, body: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(TransportResponse::new(
                    status,
                    location.map(str::to_string),
                    body,
                )));
            self
        }

        pub fn fail(self, message: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(TransportError::Unavailable(message.to_string())));
            self
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn next(&self, request: RecordedRequest) -> Result<TransportResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Unavailable("no response queued".into())))
        }
    }

    impl Transport for FakeTransport {
        fn post_json(&self, url: &str, body: String) -> Result<TransportResponse, TransportError> {
            self.next(RecordedRequest {
                method: "POST",
                url: url.to_string(),
                body: Some(body),
                query: Vec::new(),
            })
        }

        fn get(
            &self,
            url: &str,
            query: &[(&str, &str)],
        ) -> Result<TransportResponse, TransportError> {
            self.next(RecordedRequest {
                method: "GET",
                url: url.to_string(),
                body: None,
                query: query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            })
        }
    }
}
